// Copyright (c) 2022 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Actix `Actor` trait implementation.

use actix::{Actor, Context};
use log::debug;

use crate::client::HassConnection;

impl Actor for HassConnection {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!("[{}] HA connection started", self.id());
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        self.shutdown(ctx);
        debug!("[{}] HA connection stopped", self.id());
    }
}
