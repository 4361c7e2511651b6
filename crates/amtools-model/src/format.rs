// Kaldi object serialization: binary header detection and token stream reader.
//
// A Kaldi object file is binary when it starts with the two bytes `\0B`,
// otherwise it is text. Both forms are a sequence of tokens and basic values:
//
// - text: whitespace-separated words; vectors are written as `[ v1 v2 ... ]`
// - binary: tokens are terminated by a single space; every basic value is
//   preceded by a one-byte size marker (4 for `i32`, -4 for `u32`, 4 or 8 for
//   floats); integer vectors are `size-marker, count, raw items`; float
//   vectors are `FV`/`DV` token, count, raw items
//
// Raw values are stored in host byte order, as Kaldi writes them, and read
// back unaligned through bytemuck.

use bytemuck::AnyBitPattern;

use crate::ModelError;

/// Magic prefix of a binary Kaldi object.
pub const BINARY_MAGIC: [u8; 2] = [0x00, b'B'];

/// Returns `true` if `data` starts with the binary Kaldi header.
#[inline]
pub fn is_binary(data: &[u8]) -> bool {
    data.starts_with(&BINARY_MAGIC)
}

/// Cursor over a serialized Kaldi object.
pub struct KaldiReader<'a> {
    data: &'a [u8],
    pos: usize,
    binary: bool,
}

impl<'a> KaldiReader<'a> {
    /// Create a reader, detecting and skipping the binary header.
    pub fn new(data: &'a [u8]) -> Self {
        let binary = is_binary(data);
        Self {
            data,
            pos: if binary { BINARY_MAGIC.len() } else { 0 },
            binary,
        }
    }

    #[inline]
    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Current byte offset into the underlying data.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.data.len() && self.data[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ModelError> {
        let available = self.data.len() - self.pos;
        if available < len {
            return Err(ModelError::Truncated {
                offset: self.pos,
                needed: len - available,
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_raw<T: AnyBitPattern>(&mut self) -> Result<T, ModelError> {
        let bytes = self.take(size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    fn expect_size_marker(&mut self, expected: i8) -> Result<(), ModelError> {
        let offset = self.pos;
        let found = self.take(1)?[0] as i8;
        if found != expected {
            return Err(ModelError::BadSizeMarker {
                offset,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Look at the first byte of the next token without consuming it.
    ///
    /// Text mode skips leading whitespace first.
    pub fn peek(&mut self) -> Option<u8> {
        if !self.binary {
            self.skip_whitespace();
        }
        self.data.get(self.pos).copied()
    }

    /// Read one whitespace-delimited token.
    pub fn read_token(&mut self) -> Result<&'a str, ModelError> {
        self.skip_whitespace();
        let start = self.pos;
        while self.pos < self.data.len() && !self.data[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(ModelError::Truncated {
                offset: self.pos,
                needed: 1,
            });
        }
        let token = std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| ModelError::InvalidToken(start))?;
        if self.binary {
            // Binary tokens carry exactly one terminating space.
            let offset = self.pos;
            if self.take(1)? != b" " {
                return Err(ModelError::InvalidStructure(format!(
                    "token {token:?} at byte {offset} is not space-terminated"
                )));
            }
        }
        Ok(token)
    }

    /// Read a token and fail unless it equals `expected`.
    pub fn expect_token(&mut self, expected: &str) -> Result<(), ModelError> {
        let found = self.read_token()?;
        if found != expected {
            return Err(ModelError::UnexpectedToken {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    fn parse_text<T: std::str::FromStr>(&mut self) -> Result<T, ModelError> {
        let token = self.read_token()?;
        token
            .parse()
            .map_err(|_| ModelError::InvalidNumber(token.to_string()))
    }

    /// Read a signed 32-bit integer.
    pub fn read_i32(&mut self) -> Result<i32, ModelError> {
        if self.binary {
            self.expect_size_marker(4)?;
            self.read_raw()
        } else {
            self.parse_text()
        }
    }

    /// Read an unsigned 32-bit integer.
    pub fn read_u32(&mut self) -> Result<u32, ModelError> {
        if self.binary {
            self.expect_size_marker(-4)?;
            self.read_raw()
        } else {
            self.parse_text()
        }
    }

    /// Read a floating-point value stored in single or double precision.
    pub fn read_f32(&mut self) -> Result<f32, ModelError> {
        if !self.binary {
            return self.parse_text();
        }
        let offset = self.pos;
        match self.take(1)?[0] as i8 {
            4 => self.read_raw::<f32>(),
            8 => Ok(self.read_raw::<f64>()? as f32),
            found => Err(ModelError::BadSizeMarker {
                offset,
                expected: 4,
                found,
            }),
        }
    }

    /// Read a vector of `i32` (Kaldi `ReadIntegerVector`).
    pub fn read_i32_vec(&mut self) -> Result<Vec<i32>, ModelError> {
        if self.binary {
            self.expect_size_marker(4)?;
            let count = self.read_count()?;
            let bytes = self.take(count * size_of::<i32>())?;
            return Ok(bytes
                .chunks_exact(size_of::<i32>())
                .map(bytemuck::pod_read_unaligned::<i32>)
                .collect());
        }

        self.expect_token("[")?;
        let mut values = Vec::new();
        loop {
            let token = self.read_token()?;
            if token == "]" {
                return Ok(values);
            }
            let value = token
                .parse()
                .map_err(|_| ModelError::InvalidNumber(token.to_string()))?;
            values.push(value);
        }
    }

    /// Read a Kaldi `Vector<float>` (or `Vector<double>`, narrowed).
    pub fn read_f32_vector(&mut self) -> Result<Vec<f32>, ModelError> {
        if self.binary {
            let kind = self.read_token()?;
            let count = usize::try_from(self.read_i32()?)
                .map_err(|_| ModelError::InvalidStructure("negative vector dimension".into()))?;
            return match kind {
                "FV" => Ok(self
                    .take(count * size_of::<f32>())?
                    .chunks_exact(size_of::<f32>())
                    .map(bytemuck::pod_read_unaligned::<f32>)
                    .collect()),
                "DV" => Ok(self
                    .take(count * size_of::<f64>())?
                    .chunks_exact(size_of::<f64>())
                    .map(|chunk| bytemuck::pod_read_unaligned::<f64>(chunk) as f32)
                    .collect()),
                other => Err(ModelError::UnexpectedToken {
                    expected: "FV".to_string(),
                    found: other.to_string(),
                }),
            };
        }

        self.expect_token("[")?;
        let mut values = Vec::new();
        loop {
            let token = self.read_token()?;
            if token == "]" {
                return Ok(values);
            }
            let value = token
                .parse()
                .map_err(|_| ModelError::InvalidNumber(token.to_string()))?;
            values.push(value);
        }
    }

    /// Raw (marker-less) element count of a binary integer vector.
    fn read_count(&mut self) -> Result<usize, ModelError> {
        let count: i32 = self.read_raw()?;
        usize::try_from(count)
            .map_err(|_| ModelError::InvalidStructure(format!("negative vector length {count}")))
    }
}
