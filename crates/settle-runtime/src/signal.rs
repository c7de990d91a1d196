//! Decoding of protected-call results.
//!
//! A lowered region runs its body through `pcall`. The result list encodes
//! how the body finished:
//!
//! | results                     | signal            |
//! |-----------------------------|-------------------|
//! | `false, v`                  | `Thrown(v)`       |
//! | `true, true, v1, .., vn`    | `Returned(v1..)`  |
//! | `true` (nothing after)      | `Normal`          |

use crate::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum ControlSignal {
    Normal(Vec<Value>),
    Returned(Vec<Value>),
    Thrown(Value),
}

impl ControlSignal {
    /// Decode a full protected-call result list.
    pub fn decode(results: &[Value]) -> ControlSignal {
        let ok = results.first().is_some_and(Value::is_truthy);
        let signal = results.get(1).cloned().unwrap_or(Value::Nil);
        if !ok {
            return ControlSignal::Thrown(signal);
        }
        if signal.is_truthy() {
            ControlSignal::Returned(results[2..].to_vec())
        } else {
            ControlSignal::Normal(results.get(2..).map(<[Value]>::to_vec).unwrap_or_default())
        }
    }

    pub fn is_thrown(&self) -> bool {
        matches!(self, ControlSignal::Thrown(_))
    }
}
