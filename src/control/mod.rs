// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Controller state and command executors
//!
//! [`Controller`] bundles the pieces the control loop mutates: the target
//! temperature, the sliding history, the PID state, the transmission gate
//! and the status publisher. Exactly one task owns a `Controller`, so no
//! interior locking is needed; connection handlers reach it only through
//! the deferred command queue.

pub mod aircon;
pub mod pid;

pub use aircon::Aircon;
pub use pid::{PidController, PidTerms};

use std::sync::Arc;

use chrono::DateTime;
use futures::future::BoxFuture;
use log::info;
use serde_json::{json, Value};

use crate::config::{Config, PidParamFile};
use crate::ir::IrSender;
use crate::server::command::{CmdReply, CommandRegistry};
use crate::status::StatusClient;
use crate::temp::{Sample, TempHist};

/// The single-writer controller state.
pub struct Controller {
    ttemp: f64,
    rtemp: i32,
    temp: f64,
    hist: TempHist,
    pid: PidController,
    params: PidParamFile,
    aircon: Aircon,
    status: StatusClient,
    ir: Arc<dyn IrSender>,
}

impl Controller {
    pub fn new(
        config: &Config,
        params: PidParamFile,
        ttemp: f64,
        ir: Arc<dyn IrSender>,
        status: StatusClient,
    ) -> Self {
        let aircon = Aircon::new(
            ir.clone(),
            &config.aircon.dev_name,
            &config.aircon.button_header,
            config.aircon.interval_min,
        );
        Self {
            ttemp,
            rtemp: ttemp.round() as i32,
            temp: ttemp,
            hist: TempHist::new(config.temp.window_sec),
            pid: PidController::new(config.auto_aircon.kpd_clamp),
            params,
            aircon,
            status,
            ir,
        }
    }

    pub fn ttemp(&self) -> f64 {
        self.ttemp
    }

    /// The controller's view of the last commanded setpoint.
    pub fn rtemp(&self) -> i32 {
        self.rtemp
    }

    pub fn temp(&self) -> f64 {
        self.temp
    }

    pub fn history(&self) -> &TempHist {
        &self.hist
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    pub fn aircon(&self) -> &Aircon {
        &self.aircon
    }

    /// Startup sequence: force-send the current gate setpoint and publish
    /// the first status snapshot.
    pub async fn startup(&mut self) {
        self.aircon.on().await;
        self.publish_snapshot().await;
    }

    /// Process one accepted temperature sample.
    pub async fn handle_sample(&mut self, sample: Sample) {
        let temp = (sample.temp * 100.0).round() / 100.0;
        let datestr = DateTime::from_timestamp_millis((sample.ts * 1000.0) as i64)
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| format!("ts={:.3}", sample.ts));
        info!("{}: temp={:.2}", datestr, temp);

        self.temp = temp;
        self.hist.add(sample.ts, temp);

        self.publish_snapshot().await;

        if !self.aircon.is_on() {
            info!("aircon is off .. do nothing");
            return;
        }

        let Some(terms) = self.pid.step(&self.hist, self.ttemp, &self.params.param) else {
            return;
        };
        let pid = (terms.pid * 100.0).round() / 100.0;
        self.status
            .send(json!({
                "pid": pid,
                "kp_p": terms.kp_p,
                "ki_i": terms.ki_i,
                "kd_d": terms.kd_d,
                "kp": self.params.param.kp,
                "ki": self.params.param.ki,
                "kd": self.params.param.kd,
            }))
            .await;

        let desired = (self.ttemp + pid).round() as i32;
        if let Some(rtemp) = self.aircon.set_temp(desired, false).await {
            self.rtemp = rtemp;
            self.status.send(json!({ "rtemp": rtemp })).await;
        }
    }

    async fn publish_snapshot(&mut self) {
        let snapshot = json!({
            "active": self.aircon.is_on(),
            "ttemp": self.ttemp,
            "rtemp": self.rtemp,
            "temp": self.temp,
            "kp": self.params.param.kp,
            "ki": self.params.param.ki,
            "kd": self.params.param.kd,
            "interval_min": self.aircon.interval_min(),
        });
        self.status.send(snapshot).await;
    }

    //
    // command executors, run on the control thread
    //

    async fn cmd_on(&mut self, _args: &[String]) -> CmdReply {
        self.rtemp = self.ttemp.round() as i32;
        self.pid.reset();
        self.status
            .send(json!({ "active": self.aircon.is_on(), "rtemp": self.rtemp }))
            .await;

        if let Some(rtemp) = self.aircon.set_temp(self.rtemp, true).await {
            self.rtemp = rtemp;
        }
        self.status
            .send(json!({ "active": self.aircon.is_on(), "rtemp": self.rtemp }))
            .await;
        CmdReply::ok()
    }

    async fn cmd_off(&mut self, _args: &[String]) -> CmdReply {
        self.aircon.off().await;
        self.status
            .send(json!({ "active": self.aircon.is_on() }))
            .await;
        CmdReply::ok()
    }

    async fn cmd_kp(&mut self, args: &[String]) -> CmdReply {
        if args.len() == 1 {
            return CmdReply::ok_msg(self.params.param.kp);
        }
        let v = match args[1].parse::<f64>() {
            Ok(v) => v,
            Err(e) => return CmdReply::ng(format!("{}: {}", args[1], e)),
        };
        self.params.param.kp = v;
        if let Err(e) = self.params.save() {
            return CmdReply::ng(format!("{:#}", e));
        }
        self.status.send(json!({ "kp": v })).await;
        CmdReply::ok_msg(self.params.param.kp)
    }

    async fn cmd_ki(&mut self, args: &[String]) -> CmdReply {
        if args.len() == 1 {
            return CmdReply::ok_msg(self.params.param.ki);
        }
        // a new integral gain invalidates the accumulated integral
        self.pid.reset();
        let v = match args[1].parse::<f64>() {
            Ok(v) => v,
            Err(e) => return CmdReply::ng(format!("{}: {}", args[1], e)),
        };
        self.params.param.ki = v;
        if let Err(e) = self.params.save() {
            return CmdReply::ng(format!("{:#}", e));
        }
        self.status.send(json!({ "ki": v })).await;
        CmdReply::ok_msg(self.params.param.ki)
    }

    async fn cmd_kd(&mut self, args: &[String]) -> CmdReply {
        if args.len() == 1 {
            return CmdReply::ok_msg(self.params.param.kd);
        }
        let v = match args[1].parse::<f64>() {
            Ok(v) => v,
            Err(e) => return CmdReply::ng(format!("{}: {}", args[1], e)),
        };
        self.params.param.kd = v;
        if let Err(e) = self.params.save() {
            return CmdReply::ng(format!("{:#}", e));
        }
        self.status.send(json!({ "kd": v })).await;
        CmdReply::ok_msg(self.params.param.kd)
    }

    async fn cmd_temp(&mut self, _args: &[String]) -> CmdReply {
        match self.hist.tail() {
            None => CmdReply::ng("no temp data"),
            Some(sample) => CmdReply::ok_msg(sample.temp),
        }
    }

    async fn cmd_ttemp(&mut self, args: &[String]) -> CmdReply {
        if args.len() == 1 {
            return CmdReply::ok_msg(self.ttemp);
        }
        // a new target invalidates the accumulated integral
        self.pid.reset();
        let v = match args[1].parse::<f64>() {
            Ok(v) => v,
            Err(e) => return CmdReply::ng(format!("{}: {}", args[1], e)),
        };
        self.ttemp = v;
        self.status.send(json!({ "ttemp": v })).await;
        CmdReply::ok_msg(self.ttemp)
    }

    async fn cmd_rtemp(&mut self, args: &[String]) -> CmdReply {
        if args.len() == 1 {
            return CmdReply::ok_msg(format!("rtemp={}", self.rtemp));
        }
        let v = match args[1].parse::<f64>() {
            Ok(v) => v,
            Err(e) => return CmdReply::ng(format!("{}: {}", args[1], e)),
        };
        match self.aircon.set_temp(v.round() as i32, true).await {
            None => CmdReply::ng("set_temp: failed"),
            Some(rtemp) => {
                self.rtemp = rtemp;
                self.status.send(json!({ "rtemp": rtemp })).await;
                CmdReply::ok_msg(format!("rtemp={}", self.rtemp))
            }
        }
    }

    async fn cmd_interval_min(&mut self, args: &[String]) -> CmdReply {
        if args.len() == 1 {
            return CmdReply::ok_msg(self.aircon.interval_min());
        }
        let v = match args[1].parse::<f64>() {
            Ok(v) => v,
            Err(e) => return CmdReply::ng(format!("{}: {}", args[1], e)),
        };
        self.aircon.set_interval_min(v);
        self.status.send(json!({ "interval_min": v })).await;
        CmdReply::ok_msg(self.aircon.interval_min())
    }

    async fn cmd_irsend(&mut self, args: &[String]) -> CmdReply {
        if args.len() == 1 {
            return CmdReply::ok_msg(Value::from(self.ir.device_names()));
        }
        if args[1] == "@load" {
            return match self.ir.reload() {
                Ok(n) => CmdReply::ok_msg(format!("reload config data ({} definitions)", n)),
                Err(e) => CmdReply::ng(e.to_string()),
            };
        }
        let Some(detail) = self.ir.device_detail(&args[1]) else {
            return CmdReply::ng(format!("{}: no such device", args[1]));
        };
        if args.len() == 2 {
            return CmdReply::ok_msg(detail);
        }
        if args[2] == "@sleep" {
            let Some(sec) = args.get(3).and_then(|s| s.parse::<f64>().ok()) else {
                return CmdReply::ng("@sleep: seconds missing or invalid");
            };
            tokio::time::sleep(std::time::Duration::from_secs_f64(sec.max(0.0))).await;
            return CmdReply::ok_msg(format!("sleep {} sec", sec));
        }
        match self.ir.send_button(&args[1], &args[2]).await {
            Ok(()) => CmdReply::ok(),
            Err(e) => CmdReply::ng(e.to_string()),
        }
    }

    /// The full command registry: built-ins plus the controller commands.
    pub fn registry() -> CommandRegistry<Controller> {
        let mut reg = CommandRegistry::new();
        reg.add("on", None, Some(Box::new(d_on)), "Auto control ON");
        reg.add("off", None, Some(Box::new(d_off)), "Auto control OFF");
        reg.add("kp", None, Some(Box::new(d_kp)), "get and set kp");
        reg.add("ki", None, Some(Box::new(d_ki)), "get and set ki");
        reg.add("kd", None, Some(Box::new(d_kd)), "get and set kd");
        reg.add("temp", None, Some(Box::new(d_temp)), "get current temp");
        reg.add(
            "ttemp",
            None,
            Some(Box::new(d_ttemp)),
            "get or set target temp",
        );
        reg.add(
            "rtemp",
            None,
            Some(Box::new(d_rtemp)),
            "get or set remocon temp",
        );
        reg.add(
            "interval_min",
            None,
            Some(Box::new(d_interval_min)),
            "interval_min",
        );
        reg.add("irsend", None, Some(Box::new(d_irsend)), "send IR signal");
        reg.finalize();
        reg
    }
}

fn d_on<'a>(c: &'a mut Controller, args: &'a [String]) -> BoxFuture<'a, CmdReply> {
    Box::pin(c.cmd_on(args))
}

fn d_off<'a>(c: &'a mut Controller, args: &'a [String]) -> BoxFuture<'a, CmdReply> {
    Box::pin(c.cmd_off(args))
}

fn d_kp<'a>(c: &'a mut Controller, args: &'a [String]) -> BoxFuture<'a, CmdReply> {
    Box::pin(c.cmd_kp(args))
}

fn d_ki<'a>(c: &'a mut Controller, args: &'a [String]) -> BoxFuture<'a, CmdReply> {
    Box::pin(c.cmd_ki(args))
}

fn d_kd<'a>(c: &'a mut Controller, args: &'a [String]) -> BoxFuture<'a, CmdReply> {
    Box::pin(c.cmd_kd(args))
}

fn d_temp<'a>(c: &'a mut Controller, args: &'a [String]) -> BoxFuture<'a, CmdReply> {
    Box::pin(c.cmd_temp(args))
}

fn d_ttemp<'a>(c: &'a mut Controller, args: &'a [String]) -> BoxFuture<'a, CmdReply> {
    Box::pin(c.cmd_ttemp(args))
}

fn d_rtemp<'a>(c: &'a mut Controller, args: &'a [String]) -> BoxFuture<'a, CmdReply> {
    Box::pin(c.cmd_rtemp(args))
}

fn d_interval_min<'a>(c: &'a mut Controller, args: &'a [String]) -> BoxFuture<'a, CmdReply> {
    Box::pin(c.cmd_interval_min(args))
}

fn d_irsend<'a>(c: &'a mut Controller, args: &'a [String]) -> BoxFuture<'a, CmdReply> {
    Box::pin(c.cmd_irsend(args))
}

#[cfg(test)]
mod tests {
    use super::aircon::tests::RecordingSender;
    use super::*;
    use crate::config::PidParam;
    use crate::server::command::ReturnCode;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.aircon.dev_name = "tdev".to_string();
        config.temp.window_sec = 60.0;
        config
    }

    fn test_params() -> PidParamFile {
        PidParamFile::in_memory(PidParam {
            kp: 1.0,
            ki: 0.01,
            kd: 100.0,
            ki_i_max: 5.0,
            interval_min: 40.0,
        })
    }

    fn controller(ir: Arc<RecordingSender>, kpd_clamp: bool) -> Controller {
        let mut config = test_config();
        config.auto_aircon.kpd_clamp = kpd_clamp;
        Controller::new(
            &config,
            test_params(),
            25.0,
            ir,
            StatusClient::disabled(),
        )
    }

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[tokio::test]
    async fn steady_state_emits_the_target_once() {
        let ir = RecordingSender::new();
        let mut c = controller(ir.clone(), true);
        c.startup().await;
        // the gate starts at the bottom of the permitted range
        assert_eq!(ir.buttons(), vec!["tdev/on_hot_auto_20"]);

        for ts in [0.0, 10.0, 20.0, 30.0] {
            c.handle_sample(Sample { ts, temp: 25.0 }).await;
        }
        // a zero PID maps to the target; later identical setpoints are gated
        assert_eq!(
            ir.buttons(),
            vec!["tdev/on_hot_auto_20", "tdev/on_hot_auto_25"]
        );
        assert_eq!(c.rtemp(), 25);
    }

    #[tokio::test]
    async fn saturates_at_the_permitted_maximum() {
        let ir = RecordingSender::new();
        let mut c = controller(ir.clone(), false);
        c.startup().await;

        for (ts, temp) in [(0.0, 25.0), (10.0, 20.0), (20.0, 15.0), (30.0, 10.0)] {
            c.handle_sample(Sample { ts, temp }).await;
        }
        // a cold room drives the desired setpoint far above the range
        assert_eq!(c.rtemp(), 30);
        assert_eq!(ir.buttons().last().unwrap(), "tdev/on_hot_auto_30");
        // the saturated setpoint is transmitted exactly once
        assert_eq!(ir.buttons().len(), 2);
    }

    #[tokio::test]
    async fn off_suspends_the_loop_and_on_resumes() {
        let ir = RecordingSender::new();
        let mut c = controller(ir.clone(), true);
        c.startup().await;
        assert!(c.aircon().is_on());

        assert_eq!(c.cmd_off(&args("off")).await.rc, ReturnCode::Ok);
        assert!(!c.aircon().is_on());
        let sent = ir.buttons().len();

        c.handle_sample(Sample { ts: 0.0, temp: 30.0 }).await;
        c.handle_sample(Sample { ts: 10.0, temp: 30.0 }).await;
        assert_eq!(ir.buttons().len(), sent, "no emission while off");

        assert_eq!(c.cmd_on(&args("on")).await.rc, ReturnCode::Ok);
        assert!(c.aircon().is_on());
        assert_eq!(c.rtemp(), 25);
        assert!(ir.buttons().len() > sent);
    }

    #[tokio::test]
    async fn temp_query() {
        let ir = RecordingSender::new();
        let mut c = controller(ir.clone(), true);
        let reply = c.cmd_temp(&args("temp")).await;
        assert_eq!(reply.rc, ReturnCode::Ng);

        c.handle_sample(Sample {
            ts: 0.0,
            temp: 24.125,
        })
        .await;
        let reply = c.cmd_temp(&args("temp")).await;
        assert_eq!(reply.rc, ReturnCode::Ok);
        // rounded to two decimals on ingest
        assert_eq!(reply.msg.unwrap(), 24.13);
    }

    #[tokio::test]
    async fn ttemp_change_resets_the_integrator() {
        let ir = RecordingSender::new();
        let mut c = controller(ir.clone(), true);
        c.startup().await;
        c.handle_sample(Sample { ts: 0.0, temp: 30.0 }).await;
        c.handle_sample(Sample { ts: 10.0, temp: 30.0 }).await;
        assert!(c.pid().integral() != 0.0);

        let reply = c.cmd_ttemp(&args("ttemp 24.5")).await;
        assert_eq!(reply.rc, ReturnCode::Ok);
        assert_eq!(c.ttemp(), 24.5);
        assert_eq!(c.pid().integral(), 0.0);
    }

    #[tokio::test]
    async fn gain_commands_get_and_set() {
        let ir = RecordingSender::new();
        let mut c = controller(ir.clone(), true);

        let reply = c.cmd_kp(&args("kp")).await;
        assert_eq!(reply.msg.unwrap(), 1.0);

        let reply = c.cmd_kp(&args("kp 1.6")).await;
        assert_eq!(reply.rc, ReturnCode::Ok);
        assert_eq!(reply.msg.unwrap(), 1.6);

        let reply = c.cmd_kp(&args("kp abc")).await;
        assert_eq!(reply.rc, ReturnCode::Ng);
        assert_eq!(c.params.param.kp, 1.6);

        let reply = c.cmd_ki(&args("ki 0.02")).await;
        assert_eq!(reply.rc, ReturnCode::Ok);
        assert_eq!(c.params.param.ki, 0.02);
    }

    #[tokio::test]
    async fn rtemp_command_forces_a_transmission() {
        let ir = RecordingSender::new();
        let mut c = controller(ir.clone(), true);

        let reply = c.cmd_rtemp(&args("rtemp")).await;
        assert_eq!(reply.msg.unwrap(), "rtemp=25");

        let reply = c.cmd_rtemp(&args("rtemp 27.2")).await;
        assert_eq!(reply.rc, ReturnCode::Ok);
        assert_eq!(reply.msg.unwrap(), "rtemp=27");
        assert_eq!(ir.buttons().last().unwrap(), "tdev/on_hot_auto_27");

        // forced even when unchanged
        let reply = c.cmd_rtemp(&args("rtemp 27")).await;
        assert_eq!(reply.rc, ReturnCode::Ok);
        assert_eq!(ir.buttons().len(), 2);
    }

    #[tokio::test]
    async fn irsend_command_paths() {
        let ir = RecordingSender::new();
        let mut c = controller(ir.clone(), true);

        let reply = c.cmd_irsend(&args("irsend")).await;
        assert_eq!(reply.msg.unwrap(), serde_json::json!(["tdev"]));

        let reply = c.cmd_irsend(&args("irsend @load")).await;
        assert_eq!(reply.rc, ReturnCode::Ok);

        let reply = c.cmd_irsend(&args("irsend nope")).await;
        assert_eq!(reply.rc, ReturnCode::Ng);

        let reply = c.cmd_irsend(&args("irsend tdev")).await;
        assert_eq!(reply.rc, ReturnCode::Ok);

        let reply = c.cmd_irsend(&args("irsend tdev off")).await;
        assert_eq!(reply.rc, ReturnCode::Ok);
        assert_eq!(ir.buttons().last().unwrap(), "tdev/off");
    }

    #[tokio::test]
    async fn interval_min_command() {
        let ir = RecordingSender::new();
        let mut c = controller(ir.clone(), true);
        let reply = c.cmd_interval_min(&args("interval_min")).await;
        assert_eq!(reply.msg.unwrap(), 40.0);
        let reply = c.cmd_interval_min(&args("interval_min 30")).await;
        assert_eq!(reply.msg.unwrap(), 30.0);
        assert_eq!(c.aircon().interval_min(), 30.0);
    }
}
