// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Transmitter back ends: the Raspberry Pi GPIO driver and a recording mock.

pub mod gpio;
pub mod mock;
