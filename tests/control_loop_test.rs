// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! End-to-end control scenarios against the full infrared pipeline
//!
//! The controller runs with a real device store and waveform generator;
//! only the transmitter is a recording mock, so every assertion covers the
//! whole path sample -> PID -> gate -> button -> waveform.

use std::fs;
use std::sync::Arc;

use autoaircon::config::{Config, PidParam, PidParamFile};
use autoaircon::control::Controller;
use autoaircon::ir::drivers::mock::{EmissionLog, MockTransmitter};
use autoaircon::ir::wave::{total_usec, WaveBank};
use autoaircon::ir::{IrEmitter, IrSender, IrStore};
use autoaircon::status::StatusClient;
use autoaircon::temp::Sample;

const DEV_CONF: &str = r#"{
    "dev_name": "aircon",
    "T": 425,
    "sym_tbl": {"-": [8, 4], "0": [1, 1], "1": [1, 3], "/": [1, 30]},
    "macro": {"[prefix]": "- 28C6", "[suffix]": "(0b)1 /"},
    "buttons": {
        "off": "[prefix] 00 [suffix]",
        "on_hot_auto_20": "[prefix] 14 [suffix]",
        "on_hot_auto_21": "[prefix] 15 [suffix]",
        "on_hot_auto_22": "[prefix] 16 [suffix]",
        "on_hot_auto_23": "[prefix] 17 [suffix]",
        "on_hot_auto_24": "[prefix] 18 [suffix]",
        "on_hot_auto_25": "[prefix] 19 [suffix]",
        "on_hot_auto_26": "[prefix] 1A [suffix]",
        "on_hot_auto_27": "[prefix] 1B [suffix]",
        "on_hot_auto_28": "[prefix] 1C [suffix]",
        "on_hot_auto_29": "[prefix] 1D [suffix]",
        "on_hot_auto_30": "[prefix] 1E [suffix]"
    }
}"#;

struct Rig {
    controller: Controller,
    log: EmissionLog,
    store_dir: tempfile::TempDir,
}

fn rig_with(kpd_clamp: bool, param: PidParam) -> Rig {
    let store_dir = tempfile::tempdir().unwrap();
    fs::write(store_dir.path().join("aircon.irconf"), DEV_CONF).unwrap();
    let mut store = IrStore::new(vec![store_dir.path().to_path_buf()]);
    store.load_all().unwrap();

    let mock = MockTransmitter::new();
    let log = mock.log();
    let emitter: Arc<dyn IrSender> = Arc::new(IrEmitter::new(store, Box::new(mock)));

    let mut config = Config::default();
    config.temp.window_sec = 60.0;
    config.auto_aircon.kpd_clamp = kpd_clamp;

    let controller = Controller::new(
        &config,
        PidParamFile::in_memory(param),
        25.0,
        emitter,
        StatusClient::disabled(),
    );
    Rig {
        controller,
        log,
        store_dir,
    }
}

fn rig(kpd_clamp: bool) -> Rig {
    rig_with(
        kpd_clamp,
        PidParam {
            kp: 1.0,
            ki: 0.01,
            kd: 100.0,
            ki_i_max: 5.0,
            interval_min: 40.0,
        },
    )
}

/// The waveform a given button resolves to, for comparing against the log.
fn expected_steps(rig: &Rig, button: &str) -> Vec<autoaircon::ir::wave::WaveStep> {
    let mut store = IrStore::new(vec![rig.store_dir.path().to_path_buf()]);
    store.load_all().unwrap();
    let (frame, repeat) = store.resolve("aircon", button).unwrap();
    WaveBank::new().chain(&frame, repeat)
}

#[tokio::test]
async fn steady_state_emits_the_target_and_goes_quiet() {
    let mut rig = rig(true);
    rig.controller.startup().await;
    // startup force-sends the gate's initial bottom-of-range setpoint
    assert_eq!(rig.log.lock().unwrap().len(), 1);
    let startup = expected_steps(&rig, "on_hot_auto_20");
    assert_eq!(rig.log.lock().unwrap()[0].steps, startup);

    for ts in [0.0, 10.0, 20.0, 30.0] {
        rig.controller.handle_sample(Sample { ts, temp: 25.0 }).await;
    }

    let emissions = rig.log.lock().unwrap();
    assert_eq!(emissions.len(), 2, "one setpoint emission, then the dead-band");
    let target = expected_steps(&rig, "on_hot_auto_25");
    assert_eq!(emissions[1].steps, target);
    assert!(emissions[1].total_usec == total_usec(&target));
    drop(emissions);
    assert_eq!(rig.controller.rtemp(), 25);
}

#[tokio::test]
async fn cold_room_saturates_at_the_maximum_setpoint() {
    let mut rig = rig(false);
    rig.controller.startup().await;

    for (ts, temp) in [(0.0, 25.0), (10.0, 20.0), (20.0, 15.0), (30.0, 10.0)] {
        rig.controller.handle_sample(Sample { ts, temp }).await;
    }

    assert_eq!(rig.controller.rtemp(), 30);
    let emissions = rig.log.lock().unwrap();
    // startup + exactly one saturated emission
    assert_eq!(emissions.len(), 2);
    let max = expected_steps(&rig, "on_hot_auto_30");
    assert_eq!(emissions[1].steps, max);
}

#[tokio::test]
async fn stale_samples_after_reconnect_are_rejected() {
    let mut rig = rig(true);
    rig.controller.startup().await;

    rig.controller
        .handle_sample(Sample {
            ts: 100.0,
            temp: 25.0,
        })
        .await;
    rig.controller
        .handle_sample(Sample {
            ts: 110.0,
            temp: 25.0,
        })
        .await;
    assert_eq!(rig.controller.history().len(), 2);

    // a replay from before the disconnect must not enter the history
    rig.controller
        .handle_sample(Sample {
            ts: 90.0,
            temp: 30.0,
        })
        .await;
    assert_eq!(rig.controller.history().len(), 2);
    assert_eq!(rig.controller.history().dropped(), 1);
    assert_eq!(rig.controller.temp(), 30.0, "measured value still reported");

    // control resumes with the next in-order sample
    rig.controller
        .handle_sample(Sample {
            ts: 120.0,
            temp: 25.0,
        })
        .await;
    assert_eq!(rig.controller.history().len(), 3);
    assert_eq!(rig.controller.history().tail().unwrap().ts, 120.0);
}

#[tokio::test]
async fn integral_contribution_stays_bounded() {
    let param = PidParam {
        kp: 1.0,
        ki: 1.0,
        kd: 100.0,
        ki_i_max: 5.0,
        interval_min: 40.0,
    };
    let mut rig = rig_with(true, param);
    rig.controller.startup().await;

    // a persistently hot room winds the integrator up until the rollback
    // holds it at the last committed value
    for k in 0..16 {
        rig.controller
            .handle_sample(Sample {
                ts: k as f64 * 10.0,
                temp: 30.0,
            })
            .await;
        let bound = 5.0 / 1.0; // ki_i_max / ki
        assert!(
            rig.controller.pid().integral().abs() <= bound + 1e-9,
            "integrator escaped its bound at step {}",
            k
        );
    }
    // the wind-up actually reached the bound
    assert!((rig.controller.pid().integral().abs() - 5.0).abs() < 1e-9);
}
