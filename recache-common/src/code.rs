// Copyright 2026 recache Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fmt::Debug,
    hash::{BuildHasher, Hash},
    marker::PhantomData,
};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// Key trait for the cache.
pub trait Key: Send + Sync + 'static + Hash + Eq + Clone + Debug {}
impl<T: Send + Sync + 'static + Hash + Eq + Clone + Debug> Key for T {}

/// Value trait for the cache.
pub trait Value: Send + Sync + 'static + Clone {}
impl<T: Send + Sync + 'static + Clone> Value for T {}

/// Hash builder trait.
pub trait HashBuilder: BuildHasher + Send + Sync + 'static {}
impl<T> HashBuilder for T where T: BuildHasher + Send + Sync + 'static {}

/// Encode and decode keys or values of a dumped cache.
pub trait DumpCodec<T>: Send + Sync + Debug + 'static {
    /// Append the encoded form of `value` to `buf`.
    fn encode(&self, value: &T, buf: &mut Vec<u8>) -> Result<()>;

    /// Decode a value from exactly `buf`.
    fn decode(&self, buf: &[u8]) -> Result<T>;
}

/// [`DumpCodec`] for any serde type, backed by bincode.
pub struct BincodeCodec<T>(PhantomData<fn() -> T>);

impl<T> Debug for BincodeCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BincodeCodec").finish()
    }
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T> Clone for BincodeCodec<T> {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl<T> DumpCodec<T> for BincodeCodec<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn encode(&self, value: &T, buf: &mut Vec<u8>) -> Result<()> {
        bincode::serialize_into(buf, value)?;
        Ok(())
    }

    fn decode(&self, buf: &[u8]) -> Result<T> {
        Ok(bincode::deserialize(buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_bincode_codec() {
        let codec = BincodeCodec::<(u64, String)>::default();
        let mut buf = vec![];
        codec.encode(&(7, "seven".to_string()), &mut buf).unwrap();
        assert_eq!(codec.decode(&buf).unwrap(), (7, "seven".to_string()));

        let err = codec.decode(&buf[..3]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Io | ErrorKind::DumpCorrupted));
    }
}
