use crate::chain::ChainLog;
use crate::error::{IndexerError, IndexerResult};
use alloy::dyn_abi::{DynSolValue, EventExt};
use alloy::json_abi::Event;
use alloy::sol;
use alloy_primitives::{Address, B256, U256, hex};
use serde_json::{Map, Value};

sol! {
    function name() external view returns (string);
    function tradableExchange() external view returns (address);
}

pub const TRANSFER: &str =
    "event Transfer(address indexed from, address indexed to, uint256 value)";
pub const ISSUE: &str = "event Issue(address indexed from, address indexed targetAddress, address indexed lockAddress, uint256 amount)";
pub const REDEEM: &str = "event Redeem(address indexed from, address indexed targetAddress, address indexed lockAddress, uint256 amount)";
pub const LOCK: &str =
    "event Lock(address indexed accountAddress, address indexed lockAddress, uint256 value, string data)";
pub const UNLOCK: &str = "event Unlock(address indexed accountAddress, address indexed lockAddress, address recipientAddress, uint256 value, string data)";
pub const FORCE_LOCK: &str = "event ForceLock(address indexed lockAddress, address indexed accountAddress, uint256 value, string data)";
pub const FORCE_UNLOCK: &str = "event ForceUnlock(address indexed lockAddress, address indexed accountAddress, address recipientAddress, uint256 value, string data)";
pub const FORCE_CHANGE_LOCKED_ACCOUNT: &str = "event ForceChangeLockedAccount(address indexed lockAddress, address indexed beforeAccountAddress, address indexed afterAccountAddress, uint256 value, string data)";
pub const CONSUME: &str =
    "event Consume(address indexed consumer, uint256 balance, uint256 value)";
/// Emitted by the tradable exchange when a trade settles.
pub const HOLDER_CHANGED: &str = "event HolderChanged(address indexed token, address indexed from, address indexed to, uint256 value)";
pub const CHANGE_OFFERING_STATUS: &str = "event ChangeOfferingStatus(bool status)";
pub const CHANGE_INITIAL_OFFERING_STATUS: &str = "event ChangeInitialOfferingStatus(bool status)";
pub const CHANGE_STATUS: &str = "event ChangeStatus(bool status)";
pub const APPLY_FOR: &str =
    "event ApplyFor(address indexed accountAddress, uint256 amount, uint256 userAmount)";
pub const ALLOT: &str = "event Allot(address indexed accountAddress, uint256 amount)";
pub const APPLY_FOR_TRANSFER: &str = "event ApplyForTransfer(uint256 indexed index, address from, address to, uint256 value, string data)";
pub const APPROVE_TRANSFER: &str =
    "event ApproveTransfer(uint256 indexed index, address from, address to, string data)";
pub const CANCEL_TRANSFER: &str =
    "event CancelTransfer(uint256 indexed index, address from, address to)";
pub const CHANGE_TO_REDEEMED: &str = "event ChangeToRedeemed()";
pub const CHANGE_TO_CANCELED: &str = "event ChangeToCanceled()";

/// A parsed solidity event signature able to decode matching logs.
#[derive(Debug, Clone)]
pub struct EventAbi {
    event: Event,
}

impl EventAbi {
    pub fn parse(signature: &str) -> IndexerResult<Self> {
        let event = Event::parse(signature)
            .map_err(|e| IndexerError::Decode(format!("bad event signature {signature}: {e}")))?;
        Ok(Self { event })
    }

    pub fn name(&self) -> &str {
        &self.event.name
    }

    pub fn topic0(&self) -> B256 {
        self.event.selector()
    }

    pub fn decode(&self, log: &ChainLog) -> IndexerResult<DecodedLog> {
        let decoded = self
            .event
            .decode_log_parts(log.topics.iter().copied(), &log.data)
            .map_err(|e| {
                IndexerError::Decode(format!(
                    "{} at block {} log {}: {e}",
                    self.event.name, log.block_number, log.log_index
                ))
            })?;

        let mut indexed = decoded.indexed.into_iter();
        let mut body = decoded.body.into_iter();
        let mut args = Vec::with_capacity(self.event.inputs.len());
        for input in &self.event.inputs {
            let value = if input.indexed {
                indexed.next()
            } else {
                body.next()
            };
            let value = value.ok_or_else(|| {
                IndexerError::Decode(format!("{} is missing {}", self.event.name, input.name))
            })?;
            args.push((input.name.clone(), value));
        }

        Ok(DecodedLog { args })
    }
}

/// Named event arguments in declaration order.
#[derive(Debug, Clone)]
pub struct DecodedLog {
    args: Vec<(String, DynSolValue)>,
}

impl DecodedLog {
    pub fn get(&self, name: &str) -> Option<&DynSolValue> {
        self.args
            .iter()
            .find(|(arg, _)| arg == name)
            .map(|(_, value)| value)
    }

    pub fn address(&self, name: &str) -> IndexerResult<Address> {
        self.get(name)
            .and_then(DynSolValue::as_address)
            .ok_or_else(|| IndexerError::Decode(format!("argument {name} is not an address")))
    }

    /// Like [`Self::address`], but a missing argument reads as the zero address.
    pub fn address_or_zero(&self, name: &str) -> Address {
        self.get(name)
            .and_then(DynSolValue::as_address)
            .unwrap_or(Address::ZERO)
    }

    pub fn uint(&self, name: &str) -> IndexerResult<U256> {
        self.get(name)
            .and_then(DynSolValue::as_uint)
            .map(|(value, _)| value)
            .ok_or_else(|| IndexerError::Decode(format!("argument {name} is not a uint")))
    }

    pub fn to_json(&self) -> Map<String, Value> {
        self.args
            .iter()
            .map(|(name, value)| (name.clone(), json_value(value)))
            .collect()
    }
}

/// Small integers become JSON numbers, larger ones decimal strings.
pub fn json_value(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Address(address) => Value::String(address.to_checksum(None)),
        DynSolValue::Bool(flag) => Value::Bool(*flag),
        DynSolValue::Uint(number, _) => match u64::try_from(*number) {
            Ok(small) => Value::from(small),
            Err(_) => Value::String(number.to_string()),
        },
        DynSolValue::Int(number, _) => Value::String(number.to_string()),
        DynSolValue::String(text) => Value::String(text.clone()),
        DynSolValue::FixedBytes(word, size) => Value::String(hex::encode_prefixed(&word[..*size])),
        DynSolValue::Bytes(bytes) => Value::String(hex::encode_prefixed(bytes)),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(json_value).collect())
        }
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{encode_log, transfer_log};
    use alloy_primitives::address;

    #[test]
    fn test_transfer_topic_matches_erc20_selector() {
        let abi = EventAbi::parse(TRANSFER).unwrap();
        assert_eq!(abi.name(), "Transfer");
        assert_eq!(
            format!("{:?}", abi.topic0()),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn test_decode_transfer_arguments() {
        let token = address!("1000000000000000000000000000000000000001");
        let from = address!("2000000000000000000000000000000000000002");
        let to = address!("3000000000000000000000000000000000000003");
        let log = transfer_log(token, from, to, 1_500, (10, 0, 0));

        let decoded = EventAbi::parse(TRANSFER).unwrap().decode(&log).unwrap();
        assert_eq!(decoded.address("from").unwrap(), from);
        assert_eq!(decoded.address("to").unwrap(), to);
        assert_eq!(decoded.uint("value").unwrap(), U256::from(1_500u64));

        let json = decoded.to_json();
        assert_eq!(json["to"], Value::String(to.to_checksum(None)));
        assert_eq!(json["value"], Value::from(1_500u64));
    }

    #[test]
    fn test_large_values_are_rendered_as_strings() {
        let huge = U256::from(u64::MAX) + U256::from(1u64);
        assert_eq!(
            json_value(&DynSolValue::Uint(huge, 256)),
            Value::String("18446744073709551616".to_string())
        );
    }

    #[test]
    fn test_bool_argument_decodes() {
        let token = address!("1000000000000000000000000000000000000001");
        let log = encode_log(
            token,
            CHANGE_OFFERING_STATUS,
            vec![],
            vec![DynSolValue::Bool(true)],
            (3, 1, 2),
        );
        let decoded = EventAbi::parse(CHANGE_OFFERING_STATUS)
            .unwrap()
            .decode(&log)
            .unwrap();
        assert_eq!(decoded.get("status"), Some(&DynSolValue::Bool(true)));
    }

    #[test]
    fn test_decode_rejects_truncated_data() {
        let token = address!("1000000000000000000000000000000000000001");
        let mut log = transfer_log(token, Address::ZERO, token, 1, (1, 0, 0));
        log.data = Default::default();
        assert!(EventAbi::parse(TRANSFER).unwrap().decode(&log).is_err());
    }
}
