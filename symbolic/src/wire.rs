//! Stable serialization of a `SymbolicRequest` to/from the control-plane
//! wire's dynamic value type: a map with exactly the three keys
//! `fuzzer_input_offset`, `length`, `payload`. Grounded on
//! `technique/syx/request.py`'s `pack`/`unpack`.

use rmpv::Value;
use vmfuzz_common::SymbolicRequest;

pub fn pack(req: &SymbolicRequest) -> Value {
    Value::Map(vec![
        (Value::from("fuzzer_input_offset"), Value::from(req.fuzzer_input_offset)),
        (Value::from("length"), Value::from(req.length)),
        (Value::from("payload"), Value::Binary(req.payload.clone())),
    ])
}

pub fn unpack(value: &Value) -> Option<SymbolicRequest> {
    let map = value.as_map()?;
    let get = |name: &str| map.iter().find(|(k, _)| k.as_str() == Some(name)).map(|(_, v)| v);
    let fuzzer_input_offset = get("fuzzer_input_offset")?.as_u64()?;
    let length = get("length")?.as_u64()?;
    let payload = get("payload")?.as_slice()?.to_vec();
    Some(SymbolicRequest { fuzzer_input_offset, length, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips() {
        let req = SymbolicRequest::new(4, 8, b"deadbeef");
        let packed = pack(&req);
        let unpacked = unpack(&packed).unwrap();
        assert_eq!(unpacked.fuzzer_input_offset, 4);
        assert_eq!(unpacked.length, 8);
        assert_eq!(unpacked.payload, b"deadbeef");
    }
}
