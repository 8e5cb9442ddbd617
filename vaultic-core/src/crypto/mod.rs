// SPDX-FileCopyrightText: 2026 Vaultic Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod channel;

pub use channel::{ChannelError, PublicCoordinates, SecureChannel};
