//! Static contract model and deterministic identifier tables.
//!
//! A contract is declared once, as `'static` data, next to the trait it
//! describes. Client and server never exchange metadata: each side builds
//! its tables from the same descriptor, and the construction is
//! deterministic, so the assigned ids agree by construction.
//!
//! Method ids are assigned by sorting descriptors on their textual
//! signature and numbering the result 0..N-1. Event ids follow declaration
//! order. Both spaces are a single wire byte, so N caps at 256.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{BuildError, ProtocolViolation};

/// Number of identifiers a single header byte can carry.
pub const ID_SPACE: usize = 256;

/// Static description of one entity contract.
#[derive(Debug)]
pub struct ContractDescriptor {
    pub name: &'static str,
    pub methods: &'static [MethodDescriptor],
}

/// One method of a contract.
#[derive(Debug)]
pub struct MethodDescriptor {
    pub name: &'static str,
    pub params: &'static [ParamSpec],
    pub returns: ReturnSpec,
}

impl MethodDescriptor {
    /// Stable textual signature, the sort key for identifier assignment.
    ///
    /// Renaming a method or changing a type label changes the signature and
    /// with it, potentially, every assigned id — both sides must rebuild
    /// from the same descriptor revision.
    pub fn signature(&self) -> String {
        let mut sig = String::from(self.name);
        sig.push('(');
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                sig.push(',');
            }
            sig.push_str(param.type_label());
        }
        sig.push(')');
        sig
    }

    /// Number of argument slots on the wire. Caller-identity slots count:
    /// they travel as placeholders.
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// One parameter slot: a wire value with a stable type label, or the
/// caller-identity slot (redacted client-side, filled from connection
/// identity server-side).
#[derive(Debug)]
pub struct ParamSpec {
    pub name: &'static str,
    kind: ParamKind,
}

#[derive(Debug, PartialEq, Eq)]
enum ParamKind {
    Value { type_label: &'static str },
    Caller,
}

impl ParamSpec {
    pub const fn value(name: &'static str, type_label: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Value { type_label },
        }
    }

    pub const fn caller(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Caller,
        }
    }

    pub fn is_caller(&self) -> bool {
        matches!(self.kind, ParamKind::Caller)
    }

    fn type_label(&self) -> &'static str {
        match self.kind {
            ParamKind::Value { type_label } => type_label,
            ParamKind::Caller => "caller",
        }
    }
}

/// Return slot of a method.
#[derive(Debug, PartialEq, Eq)]
pub enum ReturnSpec {
    Unit,
    Value(&'static str),
}

/// Typed push payload: a serializable type tagged with its stable event
/// type label. Tables and the firing registry key on the label.
pub trait PushEvent: Serialize {
    const EVENT_TYPE: &'static str;
}

/// Deterministic method-id table for one contract.
#[derive(Debug)]
pub struct MethodTable {
    contract: &'static str,
    by_id: Vec<&'static MethodDescriptor>,
}

impl MethodTable {
    pub fn build(contract: &'static ContractDescriptor) -> Result<Self, BuildError> {
        if contract.methods.len() > ID_SPACE {
            return Err(BuildError::TooManyMethods {
                count: contract.methods.len(),
            });
        }

        let mut names = HashSet::new();
        for method in contract.methods {
            if !names.insert(method.name) {
                return Err(BuildError::DuplicateMethodName { name: method.name });
            }
        }

        let mut by_id: Vec<&'static MethodDescriptor> = contract.methods.iter().collect();
        by_id.sort_by_cached_key(|method| method.signature());
        for pair in by_id.windows(2) {
            if pair[0].signature() == pair[1].signature() {
                return Err(BuildError::DuplicateMethod {
                    signature: pair[0].signature(),
                });
            }
        }

        Ok(Self {
            contract: contract.name,
            by_id,
        })
    }

    pub fn contract(&self) -> &'static str {
        self.contract
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Resolve a method by name. An unknown name is a caller bug, caught
    /// before anything touches the wire.
    pub fn method_by_name(
        &self,
        name: &str,
    ) -> Result<(u8, &'static MethodDescriptor), ProtocolViolation> {
        self.by_id
            .iter()
            .enumerate()
            .find(|(_, method)| method.name == name)
            .map(|(id, method)| (id as u8, *method))
            .ok_or_else(|| ProtocolViolation::UnknownMethod {
                contract: self.contract,
                name: name.to_string(),
            })
    }

    /// Resolve a wire id. Out of range means a malformed or
    /// version-mismatched frame.
    pub fn method_by_id(&self, id: u8) -> Result<&'static MethodDescriptor, ProtocolViolation> {
        self.by_id
            .get(id as usize)
            .copied()
            .ok_or(ProtocolViolation::UnknownMethodId {
                contract: self.contract,
                id,
                method_count: self.by_id.len(),
            })
    }
}

/// Declaration-order event-id table. The order is part of the contract:
/// every side must declare the same types in the same order.
#[derive(Debug)]
pub struct EventTable {
    by_id: &'static [&'static str],
}

impl EventTable {
    pub fn build(event_types: &'static [&'static str]) -> Result<Self, BuildError> {
        if event_types.len() > ID_SPACE {
            return Err(BuildError::TooManyEvents {
                count: event_types.len(),
            });
        }
        for (i, &event_type) in event_types.iter().enumerate() {
            if event_types[..i].contains(&event_type) {
                return Err(BuildError::DuplicateEventType { event_type });
            }
        }
        Ok(Self { by_id: event_types })
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn declared(&self) -> &'static [&'static str] {
        self.by_id
    }

    /// `None` means the type is not declared for this entity; firing it is
    /// refused at the fire site, before anything is encoded or sent.
    pub fn id_for(&self, event_type: &str) -> Option<u8> {
        self.by_id
            .iter()
            .position(|declared| *declared == event_type)
            .map(|i| i as u8)
    }

    pub fn event_type_for(&self, id: u8) -> Result<&'static str, ProtocolViolation> {
        self.by_id
            .get(id as usize)
            .copied()
            .ok_or(ProtocolViolation::UnknownEventId {
                id,
                event_count: self.by_id.len(),
            })
    }
}
