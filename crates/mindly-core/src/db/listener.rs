//! Streaming listener for the realtime database event protocol.
//!
//! The database streams `text/event-stream` frames whose payloads are JSON
//! objects of the form `{"path": "/...", "data": ...}`. The listener mirrors
//! the watched collection node locally, applies each `put` and `patch` to
//! the mirror, and hands the full collection snapshot downstream after every
//! change. Consumers never see deltas.

use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use super::Snapshot;

/// One parsed server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct StreamEvent {
    pub name: String,
    pub data: String,
}

pub(super) enum EventOutcome {
    Changed(Snapshot),
    Ignored,
    Closed(&'static str),
}

/// Drive one chunk stream until it ends, feeding snapshots into `sender`.
///
/// Ends quietly when the receiver is dropped or the server closes the
/// stream. A dropped receiver is noticed on every frame, keep-alives
/// included, so an abandoned watch never holds its connection open.
/// Reconnecting is left to the caller opening a fresh watch.
pub(super) async fn pump_snapshots<S, B, E>(mut chunks: S, sender: mpsc::Sender<Snapshot>)
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut tree = Value::Null;
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(error) => {
                tracing::warn!("Journal stream transport error: {error}");
                return;
            }
        };
        buffer.extend_from_slice(chunk.as_ref());

        while let Some(frame) = next_frame(&mut buffer) {
            let Some(event) = parse_event(&frame) else {
                continue;
            };
            match handle_event(&mut tree, &event) {
                EventOutcome::Changed(snapshot) => {
                    if sender.send(snapshot).await.is_err() {
                        // Receiver dropped; nobody is watching anymore.
                        return;
                    }
                }
                EventOutcome::Ignored => {
                    if sender.is_closed() {
                        return;
                    }
                }
                EventOutcome::Closed(reason) => {
                    tracing::warn!("Journal stream closed: {reason}");
                    return;
                }
            }
        }
    }

    tracing::debug!("Journal stream ended");
}

/// Split the next complete event frame off the front of `buffer`.
///
/// Frames end at a blank line. The split happens on raw bytes so a
/// multi-byte character straddling a transport chunk boundary never gets
/// mangled; blank-line markers are pure ASCII.
pub(super) fn next_frame(buffer: &mut Vec<u8>) -> Option<String> {
    let lf = find_subslice(buffer, b"\n\n").map(|index| (index, 2));
    let crlf = find_subslice(buffer, b"\r\n\r\n").map(|index| (index, 4));

    let (end, width) = match (lf, crlf) {
        (Some(lf), Some(crlf)) => {
            if crlf.0 < lf.0 {
                crlf
            } else {
                lf
            }
        }
        (Some(found), None) | (None, Some(found)) => found,
        (None, None) => return None,
    };

    let frame = String::from_utf8_lossy(&buffer[..end]).into_owned();
    buffer.drain(..end + width);
    Some(frame)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse one frame into its event name and joined data payload.
///
/// Returns `None` for frames without an `event:` field, such as the comment
/// line some proxies inject.
pub(super) fn parse_event(frame: &str) -> Option<StreamEvent> {
    let mut name = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            name = Some(value.strip_prefix(' ').unwrap_or(value).to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    Some(StreamEvent {
        name: name?,
        data: data_lines.join("\n"),
    })
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    path: String,
    data: Value,
}

/// Apply one event to the mirrored tree.
pub(super) fn handle_event(tree: &mut Value, event: &StreamEvent) -> EventOutcome {
    match event.name.as_str() {
        "put" | "patch" => {
            let payload: EventPayload = match serde_json::from_str(&event.data) {
                Ok(payload) => payload,
                Err(error) => {
                    tracing::warn!("Dropping malformed {} event: {error}", event.name);
                    return EventOutcome::Ignored;
                }
            };
            if event.name == "patch" {
                apply_patch(tree, &payload.path, payload.data);
            } else {
                apply_put(tree, &payload.path, payload.data);
            }
            EventOutcome::Changed(snapshot_of(tree))
        }
        "keep-alive" => EventOutcome::Ignored,
        "cancel" => EventOutcome::Closed("cancelled by the server"),
        "auth_revoked" => EventOutcome::Closed("credential expired"),
        other => {
            tracing::debug!("Ignoring unknown stream event {other:?}");
            EventOutcome::Ignored
        }
    }
}

/// Set `data` at the slash-separated `path`, treating null as a delete.
pub(super) fn apply_put(tree: &mut Value, path: &str, data: Value) {
    let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
    put_at(tree, &segments, data);
}

fn put_at(node: &mut Value, segments: &[&str], data: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = data;
        return;
    };

    if data.is_null() {
        // Deletes never create intermediate nodes.
        let Value::Object(map) = node else { return };
        if rest.is_empty() {
            map.remove(*head);
            return;
        }
        let Some(child) = map.get_mut(*head) else {
            return;
        };
        put_at(child, rest, data);
        return;
    }

    if !matches!(node, Value::Object(_)) {
        *node = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry((*head).to_string()).or_insert(Value::Null);
        put_at(child, rest, data);
    }
}

/// Merge each key of `data` as its own put under `path`.
pub(super) fn apply_patch(tree: &mut Value, path: &str, data: Value) {
    let Value::Object(changes) = data else {
        tracing::warn!("Ignoring patch with non-object data at {path:?}");
        return;
    };
    for (key, value) in changes {
        let child_path = format!("{}/{key}", path.trim_end_matches('/'));
        apply_put(tree, &child_path, value);
    }
}

/// The collection snapshot currently held by the mirrored tree.
pub(super) fn snapshot_of(tree: &Value) -> Snapshot {
    match tree {
        Value::Object(map) => map.clone(),
        _ => Snapshot::new(),
    }
}
