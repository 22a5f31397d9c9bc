// Copyright 2025 jonefeewang@gmail.com
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

use std::path::PathBuf;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::gfx::Dimension;
use crate::{AppError, AppResult};

///
/// Payload building blocks. Integers are big-endian `u32`, strings and byte
/// strings are a `u32` length followed by the bytes, sequences are a `u32`
/// count followed by the elements.
///
/// Every decode checks the remaining length first, so a truncated or lying
/// payload fails with `MalformedProtocol` instead of panicking or allocating
/// what the peer asked for.
pub trait PrimaryType: Sized {
    /// Smallest encoded size, used to bound sequence counts.
    const MIN_WIRE_SIZE: usize;

    fn decode(buffer: &mut BytesMut) -> AppResult<Self>;
    fn encode(&self, writer: &mut BytesMut);
}

fn ensure_remaining(buffer: &BytesMut, needed: usize, what: &str) -> AppResult<()> {
    if buffer.remaining() < needed {
        return Err(AppError::MalformedProtocol(format!(
            "can not read a {}: need {} bytes, {} left",
            what,
            needed,
            buffer.remaining()
        )));
    }
    Ok(())
}

impl PrimaryType for u32 {
    const MIN_WIRE_SIZE: usize = 4;

    fn decode(buffer: &mut BytesMut) -> AppResult<Self> {
        ensure_remaining(buffer, 4, "u32")?;
        Ok(buffer.get_u32())
    }

    fn encode(&self, writer: &mut BytesMut) {
        writer.put_u32(*self);
    }
}

impl PrimaryType for Bytes {
    const MIN_WIRE_SIZE: usize = 4;

    fn decode(buffer: &mut BytesMut) -> AppResult<Self> {
        let len = u32::decode(buffer)? as usize;
        ensure_remaining(buffer, len, "byte string")?;
        Ok(buffer.split_to(len).freeze())
    }

    fn encode(&self, writer: &mut BytesMut) {
        writer.put_u32(self.len() as u32);
        writer.put_slice(self);
    }
}

impl PrimaryType for String {
    const MIN_WIRE_SIZE: usize = 4;

    fn decode(buffer: &mut BytesMut) -> AppResult<Self> {
        let bytes = Bytes::decode(buffer)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| AppError::MalformedProtocol(format!("string is not utf-8: {}", e)))
    }

    fn encode(&self, writer: &mut BytesMut) {
        writer.put_u32(self.len() as u32);
        writer.put_slice(self.as_bytes());
    }
}

/// Paths travel as the platform's own bytes.
impl PrimaryType for PathBuf {
    const MIN_WIRE_SIZE: usize = 4;

    #[cfg(unix)]
    fn decode(buffer: &mut BytesMut) -> AppResult<Self> {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let bytes = Bytes::decode(buffer)?;
        Ok(PathBuf::from(OsStr::from_bytes(&bytes)))
    }

    #[cfg(not(unix))]
    fn decode(buffer: &mut BytesMut) -> AppResult<Self> {
        Ok(PathBuf::from(String::decode(buffer)?))
    }

    #[cfg(unix)]
    fn encode(&self, writer: &mut BytesMut) {
        use std::os::unix::ffi::OsStrExt;

        let bytes = self.as_os_str().as_bytes();
        writer.put_u32(bytes.len() as u32);
        writer.put_slice(bytes);
    }

    #[cfg(not(unix))]
    fn encode(&self, writer: &mut BytesMut) {
        self.to_string_lossy().into_owned().encode(writer);
    }
}

impl PrimaryType for Dimension {
    const MIN_WIRE_SIZE: usize = 8;

    fn decode(buffer: &mut BytesMut) -> AppResult<Self> {
        let width = u32::decode(buffer)?;
        let height = u32::decode(buffer)?;
        Ok(Dimension::new(width, height))
    }

    fn encode(&self, writer: &mut BytesMut) {
        writer.put_u32(self.width);
        writer.put_u32(self.height);
    }
}

impl<T: PrimaryType> PrimaryType for Vec<T> {
    const MIN_WIRE_SIZE: usize = 4;

    fn decode(buffer: &mut BytesMut) -> AppResult<Self> {
        let count = u32::decode(buffer)? as usize;
        // a count the remaining bytes can not hold is a lie, refuse before allocating
        let needed = count.checked_mul(T::MIN_WIRE_SIZE).ok_or_else(|| {
            AppError::MalformedProtocol(format!("sequence count {} overflows", count))
        })?;
        ensure_remaining(buffer, needed, "sequence")?;

        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(T::decode(buffer)?);
        }
        Ok(values)
    }

    fn encode(&self, writer: &mut BytesMut) {
        writer.put_u32(self.len() as u32);
        for value in self {
            value.encode(writer);
        }
    }
}
