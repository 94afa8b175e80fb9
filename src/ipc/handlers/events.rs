use crate::channel::Channel;
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, respond, to_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Lets collaborators outside this process announce their own mutations.
fn events_publish(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let channel: Channel = get_required_str(params, "channel")?
        .parse()
        .map_err(|e: crate::channel::ChannelError| HandlerErr::bad_params(e.to_string()))?;
    let payload = params.get("payload").cloned().unwrap_or(serde_json::Value::Null);
    let report = state.updates.publish(channel, &payload);
    let mut result = to_json(&report)?;
    result["channel"] = json!(channel.name());
    Ok(result)
}

fn handle_events_publish(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(req, events_publish(state, &req.params))
}

fn handle_events_revisions(state: &mut AppState, req: &Request) -> serde_json::Value {
    let seen = state.revisions.snapshot();
    let mut revisions = serde_json::Map::new();
    for channel in Channel::ALL {
        let n = seen.get(&channel).copied().unwrap_or(0);
        revisions.insert(channel.name().to_string(), json!(n));
    }
    ok(
        &req.id,
        json!({
            "revisions": revisions,
            "activeChannels": state
                .updates
                .active_channels()
                .into_iter()
                .map(|c| c.name())
                .collect::<Vec<_>>()
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "events.revisions" => Some(handle_events_revisions(state, req)),
        "events.publish" => Some(handle_events_publish(state, req)),
        _ => None,
    }
}
