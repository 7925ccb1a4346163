//! Random linear network coding over the Goldilocks field.
//!
//! # Format
//!
//! Every fragment payload is a single coded row, encoded big-endian:
//!
//! ```text
//! +-------------+-----------+-----------------------+------------------+
//! | dimension k | symbols m | k coefficients (u64)  | m symbols (u64)  |
//! |   (u16)     |  (u32)    |                       |                  |
//! +-------------+-----------+-----------------------+------------------+
//! ```
//!
//! Every `u64` must be a canonical field element (less than [crate::field::P]).
//!
//! Source data is prefixed with its length (u32), split into 7-byte groups
//! (one per field element, so every group fits below the modulus), and padded
//! with zero elements until it fills `k` rows of `m` symbols.

use crate::{field::F, Decoder};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::Rng;
use std::num::NonZeroU16;
use thiserror::Error;
use tracing::trace;

/// Number of data bytes packed into one field element.
const BYTES_PER_ELEMENT: usize = 7;

/// Size of the big-endian length prefix stored ahead of the data.
const LENGTH_PREFIX: usize = 4;

/// Size of the row header (`dimension` and `symbols`).
const HEADER_SIZE: usize = 2 + 4;

/// Size of one encoded field element.
const ELEMENT_SIZE: usize = 8;

/// Errors that can occur when encoding or decoding coded rows.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("truncated payload: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("trailing bytes: {0}")]
    TrailingBytes(usize),
    #[error("zero dimension")]
    ZeroDimension,
    #[error("dimension too large: {0} (maximum {1})")]
    DimensionTooLarge(u16, u16),
    #[error("too many symbols: {0} (maximum {1})")]
    TooManySymbols(u32, u32),
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (u16, u32),
        actual: (u16, u32),
    },
    #[error("non-canonical field element: {0:#x}")]
    NonCanonical(u64),
    #[error("not enough fragments: rank {rank} of {dimension}")]
    NotEnoughFragments { rank: usize, dimension: usize },
    #[error("invalid data length: {0}")]
    InvalidDataLength(usize),
    #[error("invalid index: {0}")]
    InvalidIndex(u16),
    #[error("coefficient count mismatch: expected {expected}, got {actual}")]
    CoefficientCount { expected: usize, actual: usize },
    #[error("inconsistent")]
    Inconsistent,
}

/// Bounds applied to every row a [Rlnc] decoder consumes.
#[derive(Clone, Debug)]
pub struct Config {
    /// The largest dimension (number of source rows) a decoder will accept.
    pub max_dimension: u16,

    /// The largest number of symbols per row a decoder will accept.
    pub max_symbols: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_dimension: 256,
            max_symbols: 1 << 16,
        }
    }
}

/// A parsed row, before it is placed in the decoder.
struct Parsed {
    shape: (u16, u32),
    coefficients: Vec<F>,
    symbols: Vec<F>,
}

fn read_elements(buf: &mut impl Buf, n: usize) -> Result<Vec<F>, Error> {
    (0..n)
        .map(|_| {
            let value = buf.get_u64();
            F::canonical(value).ok_or(Error::NonCanonical(value))
        })
        .collect()
}

fn parse(payload: &[u8], config: &Config) -> Result<Parsed, Error> {
    let mut buf = payload;
    if buf.remaining() < HEADER_SIZE {
        return Err(Error::Truncated {
            expected: HEADER_SIZE,
            actual: payload.len(),
        });
    }
    let k = buf.get_u16();
    let m = buf.get_u32();
    if k == 0 {
        return Err(Error::ZeroDimension);
    }
    if k > config.max_dimension {
        return Err(Error::DimensionTooLarge(k, config.max_dimension));
    }
    if m > config.max_symbols {
        return Err(Error::TooManySymbols(m, config.max_symbols));
    }

    let body = (usize::from(k) + m as usize) * ELEMENT_SIZE;
    if buf.remaining() < body {
        return Err(Error::Truncated {
            expected: HEADER_SIZE + body,
            actual: payload.len(),
        });
    }
    if buf.remaining() > body {
        return Err(Error::TrailingBytes(buf.remaining() - body));
    }
    let coefficients = read_elements(&mut buf, usize::from(k))?;
    let symbols = read_elements(&mut buf, m as usize)?;
    Ok(Parsed {
        shape: (k, m),
        coefficients,
        symbols,
    })
}

fn write_row(coefficients: &[F], symbols: &[F]) -> Bytes {
    let mut buf = BytesMut::with_capacity(
        HEADER_SIZE + (coefficients.len() + symbols.len()) * ELEMENT_SIZE,
    );
    buf.put_u16(coefficients.len() as u16);
    buf.put_u32(symbols.len() as u32);
    for element in coefficients.iter().chain(symbols) {
        buf.put_u64(element.as_u64());
    }
    buf.freeze()
}

/// Pack up to 7 bytes into a field element, left-aligned.
fn pack(group: &[u8]) -> F {
    let mut value = 0u64;
    for byte in group {
        value = (value << 8) | u64::from(*byte);
    }
    value <<= 8 * (BYTES_PER_ELEMENT - group.len());
    F::from(value)
}

/// `target -= factor * source`, element-wise.
fn subtract_scaled(target: &mut [F], source: &[F], factor: F) {
    for (t, s) in target.iter_mut().zip(source) {
        *t = *t - factor * *s;
    }
}

fn scale(target: &mut [F], factor: F) {
    for t in target.iter_mut() {
        *t = *t * factor;
    }
}

/// Splits data into source rows and emits coded rows over them.
#[derive(Clone, Debug)]
pub struct Encoder {
    source: Vec<Vec<F>>,
}

impl Encoder {
    /// Split `data` into `dimension` source rows.
    pub fn new(data: &[u8], dimension: NonZeroU16) -> Result<Self, Error> {
        if data.len() > u32::MAX as usize {
            return Err(Error::InvalidDataLength(data.len()));
        }
        let mut prefixed = Vec::with_capacity(LENGTH_PREFIX + data.len());
        prefixed.put_u32(data.len() as u32);
        prefixed.extend_from_slice(data);

        let elements: Vec<F> = prefixed.chunks(BYTES_PER_ELEMENT).map(pack).collect();
        let k = usize::from(dimension.get());
        let m = elements.len().div_ceil(k);
        let mut source = vec![vec![F::zero(); m]; k];
        for (i, element) in elements.into_iter().enumerate() {
            source[i / m][i % m] = element;
        }
        Ok(Self { source })
    }

    /// Returns the number of source rows.
    pub fn dimension(&self) -> u16 {
        self.source.len() as u16
    }

    /// Returns the number of symbols in every row.
    pub fn symbols(&self) -> usize {
        self.source[0].len()
    }

    /// Emit a row combining the source rows with the given coefficients.
    pub fn combine(&self, coefficients: &[F]) -> Result<Bytes, Error> {
        if coefficients.len() != self.source.len() {
            return Err(Error::CoefficientCount {
                expected: self.source.len(),
                actual: coefficients.len(),
            });
        }
        let mut symbols = vec![F::zero(); self.symbols()];
        for (row, coefficient) in self.source.iter().zip(coefficients) {
            for (symbol, s) in symbols.iter_mut().zip(row) {
                *symbol = *symbol + *coefficient * *s;
            }
        }
        Ok(write_row(coefficients, &symbols))
    }

    /// Emit the `index`-th source row, tagged with a unit coefficient vector.
    pub fn systematic(&self, index: u16) -> Result<Bytes, Error> {
        let i = usize::from(index);
        if i >= self.source.len() {
            return Err(Error::InvalidIndex(index));
        }
        let mut coefficients = vec![F::zero(); self.source.len()];
        coefficients[i] = F::one();
        Ok(write_row(&coefficients, &self.source[i]))
    }

    /// Emit a random linear combination of all source rows.
    pub fn fragment(&self, rng: &mut impl Rng) -> Bytes {
        let coefficients: Vec<F> = (0..self.source.len())
            .map(|_| F::from(rng.gen::<u64>()))
            .collect();
        let mut symbols = vec![F::zero(); self.symbols()];
        for (row, coefficient) in self.source.iter().zip(&coefficients) {
            for (symbol, s) in symbols.iter_mut().zip(row) {
                *symbol = *symbol + *coefficient * *s;
            }
        }
        write_row(&coefficients, &symbols)
    }
}

/// A row held in reduced row-echelon form.
struct Row {
    pivot: usize,
    coefficients: Vec<F>,
    symbols: Vec<F>,
}

/// An incremental Gauss-Jordan decoder.
///
/// Rows are kept in reduced row-echelon form, so the rank is the number of
/// stored rows and a new row is independent exactly when it survives
/// reduction with a non-zero coefficient.
pub struct Rlnc {
    config: Config,
    shape: Option<(u16, u32)>,
    rows: Vec<Row>,
}

impl Rlnc {
    /// Returns the `(dimension, symbols)` fixed by the first accepted row.
    pub fn shape(&self) -> Option<(u16, u32)> {
        self.shape
    }

    /// Reconstruct the source data.
    ///
    /// Fails until [Decoder::is_complete] holds.
    pub fn decode(&self) -> Result<Vec<u8>, Error> {
        let dimension = self.shape.map(|(k, _)| usize::from(k)).unwrap_or(0);
        if dimension == 0 || self.rows.len() < dimension {
            return Err(Error::NotEnoughFragments {
                rank: self.rows.len(),
                dimension,
            });
        }

        // At full rank every row is a unit vector, so its symbols are a source row.
        let mut ordered: Vec<&Row> = self.rows.iter().collect();
        ordered.sort_by_key(|row| row.pivot);
        let mut bytes = Vec::new();
        for row in ordered {
            for symbol in &row.symbols {
                let value = symbol.as_u64();
                if value >> (8 * BYTES_PER_ELEMENT) != 0 {
                    return Err(Error::Inconsistent);
                }
                bytes.extend_from_slice(&value.to_be_bytes()[8 - BYTES_PER_ELEMENT..]);
            }
        }

        if bytes.len() < LENGTH_PREFIX {
            return Err(Error::Inconsistent);
        }
        let len = (&bytes[..LENGTH_PREFIX]).get_u32() as usize;
        if LENGTH_PREFIX + len > bytes.len() {
            return Err(Error::Inconsistent);
        }
        Ok(bytes[LENGTH_PREFIX..LENGTH_PREFIX + len].to_vec())
    }
}

impl Decoder for Rlnc {
    type Config = Config;
    type Error = Error;

    fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            shape: None,
            rows: Vec::new(),
        }
    }

    fn rank(&self) -> usize {
        self.rows.len()
    }

    fn consume(&mut self, payload: &[u8]) -> Result<(), Error> {
        let Parsed {
            shape,
            mut coefficients,
            mut symbols,
        } = parse(payload, &self.config)?;
        if let Some(expected) = self.shape {
            if expected != shape {
                return Err(Error::ShapeMismatch {
                    expected,
                    actual: shape,
                });
            }
        }
        self.shape = Some(shape);

        // Clear every existing pivot column from the incoming row
        for row in &self.rows {
            let factor = coefficients[row.pivot];
            if factor.is_zero() {
                continue;
            }
            subtract_scaled(&mut coefficients, &row.coefficients, factor);
            subtract_scaled(&mut symbols, &row.symbols, factor);
        }

        // Nothing left means the row lies in the span we already hold
        let Some((pivot, inverse)) = coefficients
            .iter()
            .enumerate()
            .find_map(|(i, c)| c.inv().map(|inverse| (i, inverse)))
        else {
            trace!(rank = self.rows.len(), "dependent row");
            return Ok(());
        };
        scale(&mut coefficients, inverse);
        scale(&mut symbols, inverse);

        // Keep the stored rows reduced with respect to the new pivot
        for row in &mut self.rows {
            let factor = row.coefficients[pivot];
            if factor.is_zero() {
                continue;
            }
            subtract_scaled(&mut row.coefficients, &coefficients, factor);
            subtract_scaled(&mut row.symbols, &symbols, factor);
        }
        self.rows.push(Row {
            pivot,
            coefficients,
            symbols,
        });
        trace!(rank = self.rows.len(), pivot, "independent row");
        Ok(())
    }

    fn is_complete(&self) -> bool {
        matches!(self.shape, Some((k, _)) if self.rows.len() == usize::from(k))
    }
}
