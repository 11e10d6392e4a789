//! LZW codec for TIFF Compression = 5.
//!
//! Codes are packed MSB-first. The table is seeded with the 256 single-byte
//! strings, followed by ClearCode (256) and EoiCode (257). Code width starts
//! at 9 bits. The decoder widens one code early: when the next free table
//! slot reaches 511, 1023 and 2047. The encoder, which runs one entry ahead of
//! the decoder, widens when its next free slot reaches 512, 1024 and 2048.

use std::collections::HashMap;

use crate::error::TiffError;

pub const CLEAR_CODE: u16 = 256;
pub const EOI_CODE: u16 = 257;

const FIRST_FREE_CODE: usize = 258;
const MIN_CODE_WIDTH: u32 = 9;
const MAX_CODE_WIDTH: u32 = 12;
const TABLE_SIZE: usize = 1 << MAX_CODE_WIDTH;

/// The encoder emits a ClearCode once its table reaches this many entries.
const ENCODER_RESET_AT: usize = TABLE_SIZE - 2;

// =============================================================================
// Decoder
// =============================================================================

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u32,
    nbits: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            acc: 0,
            nbits: 0,
        }
    }

    fn read(&mut self, width: u32) -> Option<u16> {
        while self.nbits < width {
            let byte = *self.data.get(self.pos)?;
            self.pos += 1;
            self.acc = (self.acc << 8) | byte as u32;
            self.nbits += 8;
        }
        let code = (self.acc >> (self.nbits - width)) & ((1 << width) - 1);
        self.nbits -= width;
        Some(code as u16)
    }
}

struct DecodeTable {
    prefix: Vec<u16>,
    suffix: Vec<u8>,
    length: Vec<u16>,
    next: usize,
}

impl DecodeTable {
    fn new() -> Self {
        let mut table = Self {
            prefix: vec![0; TABLE_SIZE],
            suffix: vec![0; TABLE_SIZE],
            length: vec![0; TABLE_SIZE],
            next: FIRST_FREE_CODE,
        };
        for code in 0..256 {
            table.suffix[code] = code as u8;
            table.length[code] = 1;
        }
        table
    }

    fn reset(&mut self) {
        self.next = FIRST_FREE_CODE;
    }

    fn add(&mut self, prefix: u16, byte: u8) {
        if self.next < TABLE_SIZE {
            self.prefix[self.next] = prefix;
            self.suffix[self.next] = byte;
            self.length[self.next] = self.length[prefix as usize] + 1;
            self.next += 1;
        }
    }

    /// Append the string for `code` to `out`, returning its first byte.
    fn append(&self, code: u16, out: &mut Vec<u8>) -> u8 {
        let len = self.length[code as usize] as usize;
        let start = out.len();
        out.resize(start + len, 0);

        let mut c = code as usize;
        for i in (0..len).rev() {
            out[start + i] = self.suffix[c];
            c = self.prefix[c] as usize;
        }
        out[start]
    }
}

/// Decode an LZW stream.
///
/// `expected_len` is a capacity hint; decoding stops at EoiCode or at the end
/// of the input, so a truncated stream yields the bytes decoded so far.
/// A stream that does not start with ClearCode is accepted.
pub fn decode(input: &[u8], expected_len: usize) -> Result<Vec<u8>, TiffError> {
    let mut out = Vec::with_capacity(expected_len);
    let mut bits = BitReader::new(input);
    let mut table = DecodeTable::new();
    let mut width = MIN_CODE_WIDTH;
    let mut prev: Option<u16> = None;

    while let Some(code) = bits.read(width) {
        if code == EOI_CODE {
            break;
        }
        if code == CLEAR_CODE {
            table.reset();
            width = MIN_CODE_WIDTH;
            prev = None;
            continue;
        }

        let Some(prev_code) = prev else {
            if code >= 256 {
                return Err(TiffError::Lzw(format!(
                    "first code after reset must be a literal, got {}",
                    code
                )));
            }
            out.push(code as u8);
            prev = Some(code);
            continue;
        };

        let first_byte = if (code as usize) < table.next {
            table.append(code, &mut out)
        } else if code as usize == table.next {
            // The string being defined: previous string plus its own first byte
            let first = table.append(prev_code, &mut out);
            out.push(first);
            first
        } else {
            return Err(TiffError::Lzw(format!(
                "code {} out of range (next free code {})",
                code, table.next
            )));
        };

        table.add(prev_code, first_byte);
        if table.next >= (1 << width) - 1 && width < MAX_CODE_WIDTH {
            width += 1;
        }
        prev = Some(code);
    }

    Ok(out)
}

// =============================================================================
// Encoder
// =============================================================================

struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    nbits: u32,
}

impl BitWriter {
    fn new(capacity: usize) -> Self {
        Self {
            out: Vec::with_capacity(capacity),
            acc: 0,
            nbits: 0,
        }
    }

    fn write(&mut self, code: u16, width: u32) {
        self.acc = (self.acc << width) | code as u32;
        self.nbits += width;
        while self.nbits >= 8 {
            self.out.push((self.acc >> (self.nbits - 8)) as u8);
            self.nbits -= 8;
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.nbits > 0 {
            self.out.push((self.acc << (8 - self.nbits)) as u8);
        }
        self.out
    }
}

/// Encode bytes as a TIFF LZW stream.
///
/// The stream starts with ClearCode and ends with EoiCode. The table is
/// reset with a ClearCode before it fills.
pub fn encode(input: &[u8]) -> Vec<u8> {
    let mut writer = BitWriter::new(input.len() / 2 + 4);
    let mut dict: HashMap<(u16, u8), u16> = HashMap::new();
    let mut width = MIN_CODE_WIDTH;
    let mut next = FIRST_FREE_CODE;

    writer.write(CLEAR_CODE, width);

    let Some((&first, rest)) = input.split_first() else {
        writer.write(EOI_CODE, width);
        return writer.finish();
    };

    let mut current = first as u16;
    for &byte in rest {
        if let Some(&code) = dict.get(&(current, byte)) {
            current = code;
            continue;
        }

        writer.write(current, width);
        dict.insert((current, byte), next as u16);
        next += 1;

        if next == ENCODER_RESET_AT {
            writer.write(CLEAR_CODE, width);
            dict.clear();
            next = FIRST_FREE_CODE;
            width = MIN_CODE_WIDTH;
        } else if next > (1 << width) - 1 && width < MAX_CODE_WIDTH {
            width += 1;
        }
        current = byte as u16;
    }

    writer.write(current, width);

    // The decoder adds one more entry after reading the final code
    next += 1;
    if next > (1 << width) - 1 && width < MAX_CODE_WIDTH {
        width += 1;
    }
    writer.write(EOI_CODE, width);
    writer.finish()
}
