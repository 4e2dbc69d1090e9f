//! Last-writer-wins register keyed by `EventId`.

use serde::{Deserialize, Serialize};

use crate::model::{EventId, ValueRef};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LwwRegister {
    pub value: ValueRef,
    pub event_id: EventId,
}

impl LwwRegister {
    pub fn new(value: ValueRef, event_id: EventId) -> Self {
        Self { value, event_id }
    }

    /// Keeps the register with the higher `EventId`. Ties are structurally
    /// impossible in practice since `patch_sha` differs between any two
    /// distinct patches.
    pub fn set(cur: Option<LwwRegister>, new_event: EventId, new_value: ValueRef) -> LwwRegister {
        match cur {
            Some(existing) if existing.event_id >= new_event => existing,
            _ => LwwRegister::new(new_value, new_event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CborValue;

    fn event(lamport: u64, writer: &str) -> EventId {
        EventId {
            lamport,
            writer: writer.into(),
            patch_sha: format!("sha-{writer}-{lamport}"),
            op_index: 0,
        }
    }

    #[test]
    fn higher_event_id_wins_lww_total_order() {
        let a = event(5, "A");
        let b = event(5, "B");
        assert!(a < b);

        let reg = LwwRegister::set(
            Some(LwwRegister::new(ValueRef::Inline(CborValue::Text("A".into())), a)),
            b,
            ValueRef::Inline(CborValue::Text("B".into())),
        );
        assert_eq!(reg.value, ValueRef::Inline(CborValue::Text("B".into())));
    }

    #[test]
    fn result_independent_of_application_order() {
        let a = event(5, "A");
        let b = event(5, "B");
        let val_a = ValueRef::Inline(CborValue::Text("A".into()));
        let val_b = ValueRef::Inline(CborValue::Text("B".into()));

        let order1 = {
            let r = LwwRegister::set(None, a.clone(), val_a.clone());
            LwwRegister::set(Some(r), b.clone(), val_b.clone())
        };
        let order2 = {
            let r = LwwRegister::set(None, b, val_b.clone());
            LwwRegister::set(Some(r), a, val_a)
        };
        assert_eq!(order1.value, order2.value);
        assert_eq!(order1.value, val_b);
    }
}
