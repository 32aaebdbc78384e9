// Copyright (c) 2022 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Actix message handlers of the Home Assistant connection.

use crate::client::HassConnection;
use crate::client::messages::{
    CallService, Connect, Disconnect, GetStates, GetStatus, SendJson, SubscribeStateChanges,
    SubscribeStatus, Unsubscribe,
};
use crate::client::status::StatusChange;
use crate::errors::ServiceError;
use actix::{Handler, MessageResult};

impl Handler<Connect> for HassConnection {
    type Result = ();

    fn handle(&mut self, msg: Connect, ctx: &mut Self::Context) -> Self::Result {
        let actions = self.manager.connect(msg.url, msg.token);
        self.execute(actions, ctx);
    }
}

impl Handler<Disconnect> for HassConnection {
    type Result = ();

    fn handle(&mut self, _: Disconnect, ctx: &mut Self::Context) -> Self::Result {
        let actions = self.manager.disconnect();
        self.execute(actions, ctx);
    }
}

impl Handler<SubscribeStatus> for HassConnection {
    type Result = MessageResult<SubscribeStatus>;

    fn handle(&mut self, msg: SubscribeStatus, _: &mut Self::Context) -> Self::Result {
        MessageResult(self.manager.subscribe_status(msg.0))
    }
}

impl Handler<SubscribeStateChanges> for HassConnection {
    type Result = MessageResult<SubscribeStateChanges>;

    fn handle(&mut self, msg: SubscribeStateChanges, _: &mut Self::Context) -> Self::Result {
        MessageResult(self.manager.subscribe_state_changes(msg.0))
    }
}

impl Handler<Unsubscribe> for HassConnection {
    type Result = bool;

    fn handle(&mut self, msg: Unsubscribe, _: &mut Self::Context) -> Self::Result {
        self.manager.unsubscribe(msg.0)
    }
}

impl Handler<CallService> for HassConnection {
    type Result = Result<(), ServiceError>;

    fn handle(&mut self, msg: CallService, ctx: &mut Self::Context) -> Self::Result {
        let actions = self.manager.call_service(msg.call)?;
        self.execute(actions, ctx);
        Ok(())
    }
}

impl Handler<SendJson> for HassConnection {
    type Result = Result<(), ServiceError>;

    fn handle(&mut self, msg: SendJson, ctx: &mut Self::Context) -> Self::Result {
        let actions = self.manager.send_json(msg.0)?;
        self.execute(actions, ctx);
        Ok(())
    }
}

impl Handler<GetStates> for HassConnection {
    type Result = ();

    fn handle(&mut self, _: GetStates, ctx: &mut Self::Context) -> Self::Result {
        let actions = self.manager.get_states();
        self.execute(actions, ctx);
    }
}

impl Handler<GetStatus> for HassConnection {
    type Result = MessageResult<GetStatus>;

    fn handle(&mut self, _: GetStatus, _: &mut Self::Context) -> Self::Result {
        MessageResult(StatusChange {
            status: self.manager.status(),
            error: self.manager.error_message().map(str::to_string),
        })
    }
}
