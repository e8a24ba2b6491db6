//! Message processing: the TEA update loop plus action dispatch

use hubdeck_core::prelude::*;

use crate::actions::{handle_action, ActionContext};
use crate::handler;
use crate::message::Message;
use crate::state::AppState;

/// Process a message through the TEA update function
///
/// Follow-up messages run in the same call, after the action that came with
/// them has been dispatched. A close queued by one step therefore always
/// reaches the transport worker before the open queued by the next.
pub fn process_message(state: &mut AppState, message: Message, ctx: &ActionContext) {
    if let Message::Transport(event) = &message {
        trace!("Transport event: {}", event.name());
    }

    let mut msg = Some(message);
    while let Some(m) = msg {
        let result = handler::update(state, m);

        if let Some(action) = result.action {
            handle_action(action, ctx);
        }

        msg = result.message;
    }
}
