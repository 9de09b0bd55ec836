//! Task arguments
//!
//! An argument either travels by value (an already-encoded payload copied to
//! the executor) or by reference (an object id resolved on the executing side
//! before the callee runs). Never both.

use crate::codec::encode;
use crate::errors::CodecError;
use crate::ids::ObjectId;
use bytes::Bytes;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskArg {
    /// Pass-by-value payload
    Value(Bytes),
    /// Pass-by-reference object
    Reference(ObjectId),
}

impl TaskArg {
    /// Encode a value and pass it by copy
    pub fn value<T: Serialize + ?Sized>(value: &T) -> Result<Self, CodecError> {
        encode(value).map(TaskArg::Value)
    }

    pub fn reference(id: ObjectId) -> Self {
        TaskArg::Reference(id)
    }

    pub fn object_id(&self) -> Option<&ObjectId> {
        match self {
            TaskArg::Reference(id) => Some(id),
            TaskArg::Value(_) => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, TaskArg::Reference(_))
    }
}

impl From<Bytes> for TaskArg {
    fn from(payload: Bytes) -> Self {
        TaskArg::Value(payload)
    }
}

impl From<ObjectId> for TaskArg {
    fn from(id: ObjectId) -> Self {
        TaskArg::Reference(id)
    }
}

/// Object ids referenced by an argument list, in argument order
pub fn referenced_objects(args: &[TaskArg]) -> Vec<ObjectId> {
    args.iter().filter_map(|a| a.object_id().copied()).collect()
}
