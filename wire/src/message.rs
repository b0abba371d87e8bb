use rmpv::Value;

use crate::error::WireError;

/// One control-plane message. Every wire frame is a self-describing map with
/// an integer `type` tag plus type-specific keys, matching the table in
/// the control-plane wire component design. Encoded as a tagged variant here
/// instead of the original's dict-with-int-key dispatch.
#[derive(Debug, Clone)]
pub enum Message {
    Ready { worker_id: u64 },
    Import { task: Value },
    ImportSyx { task: Value },
    RunNode { task: Value },
    NodeDone { node_id: u64, results: Value, new_payload: Vec<u8> },
    NodeAbort { node_id: u64, results: Value },
    NewInput { payload: Vec<u8>, bitmap: Vec<u8>, info: Value },
    Busy,
    SymWait,
    SymNew { requests: Vec<Value> },
    SymRequest { request: Value },
    SymResult { results: Value },
    Print { msg: String },
}

impl Message {
    const READY: i64 = 0;
    const IMPORT: i64 = 1;
    const RUN_NODE: i64 = 2;
    const NODE_DONE: i64 = 3;
    const NEW_INPUT: i64 = 4;
    const BUSY: i64 = 5;
    const NODE_ABORT: i64 = 6;
    const SYM_WAIT: i64 = 7;
    const SYM_NEW: i64 = 8;
    const SYM_REQUEST: i64 = 9;
    const SYM_RESULT: i64 = 10;
    const IMPORT_SYX: i64 = 11;
    const PRINT: i64 = 12;

    pub fn encode(&self) -> Value {
        let (ty, mut fields): (i64, Vec<(Value, Value)>) = match self {
            Message::Ready { worker_id } => {
                (Self::READY, vec![(key("worker_id"), Value::from(*worker_id))])
            }
            Message::Import { task } => (Self::IMPORT, vec![(key("task"), task.clone())]),
            Message::ImportSyx { task } => (Self::IMPORT_SYX, vec![(key("task"), task.clone())]),
            Message::RunNode { task } => (Self::RUN_NODE, vec![(key("task"), task.clone())]),
            Message::NodeDone { node_id, results, new_payload } => (
                Self::NODE_DONE,
                vec![
                    (key("node_id"), Value::from(*node_id)),
                    (key("results"), results.clone()),
                    (key("new_payload"), Value::Binary(new_payload.clone())),
                ],
            ),
            Message::NodeAbort { node_id, results } => (
                Self::NODE_ABORT,
                vec![(key("node_id"), Value::from(*node_id)), (key("results"), results.clone())],
            ),
            Message::NewInput { payload, bitmap, info } => (
                Self::NEW_INPUT,
                vec![(
                    key("input"),
                    Value::Map(vec![
                        (key("payload"), Value::Binary(payload.clone())),
                        (key("bitmap"), Value::Binary(bitmap.clone())),
                        (key("info"), info.clone()),
                    ]),
                )],
            ),
            Message::Busy => (Self::BUSY, vec![]),
            Message::SymWait => (Self::SYM_WAIT, vec![]),
            Message::SymNew { requests } => {
                (Self::SYM_NEW, vec![(key("requests"), Value::Array(requests.clone()))])
            }
            Message::SymRequest { request } => {
                (Self::SYM_REQUEST, vec![(key("request"), request.clone())])
            }
            Message::SymResult { results } => {
                (Self::SYM_RESULT, vec![(key("results"), results.clone())])
            }
            Message::Print { msg } => (Self::PRINT, vec![(key("msg"), Value::from(msg.as_str()))]),
        };
        let mut map = vec![(key("type"), Value::from(ty))];
        map.append(&mut fields);
        Value::Map(map)
    }

    pub fn decode(value: &Value) -> Result<Self, WireError> {
        let map = value.as_map().ok_or_else(|| WireError::Decode("frame is not a map".into()))?;
        let ty = find(map, "type")
            .and_then(|v| v.as_i64())
            .ok_or(WireError::MissingKey("type"))?;

        Ok(match ty {
            Self::READY => Message::Ready {
                worker_id: require_u64(map, "worker_id")?,
            },
            Self::IMPORT => Message::Import { task: require(map, "task")?.clone() },
            Self::IMPORT_SYX => Message::ImportSyx { task: require(map, "task")?.clone() },
            Self::RUN_NODE => Message::RunNode { task: require(map, "task")?.clone() },
            Self::NODE_DONE => Message::NodeDone {
                node_id: require_u64(map, "node_id")?,
                results: require(map, "results")?.clone(),
                new_payload: require_bin(map, "new_payload")?,
            },
            Self::NODE_ABORT => Message::NodeAbort {
                node_id: require_u64(map, "node_id")?,
                results: require(map, "results")?.clone(),
            },
            Self::NEW_INPUT => {
                let input = require(map, "input")?;
                let input_map =
                    input.as_map().ok_or_else(|| WireError::Decode("input is not a map".into()))?;
                Message::NewInput {
                    payload: require_bin(input_map, "payload")?,
                    bitmap: require_bin(input_map, "bitmap")?,
                    info: require(input_map, "info")?.clone(),
                }
            }
            Self::BUSY => Message::Busy,
            Self::SYM_WAIT => Message::SymWait,
            Self::SYM_NEW => {
                let arr = require(map, "requests")?
                    .as_array()
                    .ok_or_else(|| WireError::Decode("requests is not an array".into()))?;
                Message::SymNew { requests: arr.clone() }
            }
            Self::SYM_REQUEST => Message::SymRequest { request: require(map, "request")?.clone() },
            Self::SYM_RESULT => Message::SymResult { results: require(map, "results")?.clone() },
            Self::PRINT => Message::Print {
                msg: require(map, "msg")?
                    .as_str()
                    .ok_or_else(|| WireError::Decode("msg is not a string".into()))?
                    .to_string(),
            },
            other => return Err(WireError::UnknownType(other)),
        })
    }
}

fn key(s: &str) -> Value {
    Value::from(s)
}

fn find<'a>(map: &'a [(Value, Value)], name: &str) -> Option<&'a Value> {
    map.iter().find(|(k, _)| k.as_str() == Some(name)).map(|(_, v)| v)
}

fn require<'a>(map: &'a [(Value, Value)], name: &'static str) -> Result<&'a Value, WireError> {
    find(map, name).ok_or(WireError::MissingKey(name))
}

fn require_u64(map: &[(Value, Value)], name: &'static str) -> Result<u64, WireError> {
    require(map, name)?.as_u64().ok_or(WireError::MissingKey(name))
}

fn require_bin(map: &[(Value, Value)], name: &'static str) -> Result<Vec<u8>, WireError> {
    require(map, name)?
        .as_slice()
        .map(|s| s.to_vec())
        .ok_or(WireError::MissingKey(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_round_trips() {
        let msg = Message::Ready { worker_id: 3 };
        let decoded = Message::decode(&msg.encode()).unwrap();
        match decoded {
            Message::Ready { worker_id } => assert_eq!(worker_id, 3),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn new_input_round_trips() {
        let msg = Message::NewInput {
            payload: vec![1, 2, 3],
            bitmap: vec![0; 4],
            info: Value::Nil,
        };
        let decoded = Message::decode(&msg.encode()).unwrap();
        match decoded {
            Message::NewInput { payload, bitmap, .. } => {
                assert_eq!(payload, vec![1, 2, 3]);
                assert_eq!(bitmap, vec![0; 4]);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let frame = Value::Map(vec![(Value::from("type"), Value::from(99))]);
        assert!(Message::decode(&frame).is_err());
    }
}
