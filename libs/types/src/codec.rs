//! Payload Codec
//!
//! The gateway itself only moves opaque `Bytes`. The typed facade and the
//! function registry use bincode over serde to turn Rust values into those
//! payloads and back.

use crate::errors::CodecError;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a value into an opaque payload
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, CodecError> {
    bincode::serialize(value)
        .map(Bytes::from)
        .map_err(|e| CodecError::Encode {
            type_name: std::any::type_name::<T>(),
            message: e.to_string(),
        })
}

/// Decode a payload produced by [`encode`]
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(payload).map_err(|e| CodecError::Decode {
        type_name: std::any::type_name::<T>(),
        message: e.to_string(),
    })
}

/// Decode a positional argument list into a tuple
pub trait FromArgs: Sized {
    /// Number of positional arguments expected
    const ARITY: usize;

    fn from_args(args: &[Bytes]) -> Result<Self, CodecError>;
}

macro_rules! impl_from_args {
    ($arity:expr; $($ty:ident => $idx:tt),*) => {
        impl<$($ty: DeserializeOwned),*> FromArgs for ($($ty,)*) {
            const ARITY: usize = $arity;

            #[allow(unused_variables)]
            fn from_args(args: &[Bytes]) -> Result<Self, CodecError> {
                if args.len() != $arity {
                    return Err(CodecError::Arity {
                        expected: $arity,
                        actual: args.len(),
                    });
                }
                Ok(($(decode::<$ty>(&args[$idx])?,)*))
            }
        }
    };
}

impl_from_args!(0;);
impl_from_args!(1; A => 0);
impl_from_args!(2; A => 0, B => 1);
impl_from_args!(3; A => 0, B => 1, C => 2);
impl_from_args!(4; A => 0, B => 1, C => 2, D => 3);
impl_from_args!(5; A => 0, B => 1, C => 2, D => 3, E => 4);
impl_from_args!(6; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5);
