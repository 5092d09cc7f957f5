#![deny(unsafe_code)]

//! Converting sample data from textual to binary format.
//!
//! Reads whitespace-delimited lines `KEY FLAGS CRC BODY_SIZE BODY_SEED` on
//! stdin and writes external-format records to stdout. The key is truncated
//! to 64 bytes and zero-padded; the body is `BODY_SIZE` reproducible
//! pseudo-random bytes from a 32-bit Mersenne Twister seeded with
//! `BODY_SEED`. Lines that do not parse, or that declare an oversized body,
//! are reported on stderr and skipped.

use std::io::{self, BufRead, BufWriter, Write};

use anyhow::{Context, Result};
use rand_mt::Mt19937GenRand32;

use xxlsort_lib::buffer::Repr;
use xxlsort_lib::record::{RecordHeader, KEY_SIZE, MAX_BODY_SIZE};

struct SampleLine {
    header: RecordHeader,
    body_seed: u64,
}

fn parse_line(line: &str) -> Option<SampleLine> {
    let mut fields = line.split_whitespace();
    let key_text = fields.next()?;
    let flags: u64 = fields.next()?.parse().ok()?;
    let crc: u64 = fields.next()?.parse().ok()?;
    let body_size: u64 = fields.next()?.parse().ok()?;
    let body_seed: u64 = fields.next()?.parse().ok()?;
    if body_size > MAX_BODY_SIZE {
        return None;
    }

    let mut key = [0u8; KEY_SIZE];
    let bytes = key_text.as_bytes();
    let take = bytes.len().min(KEY_SIZE);
    key[..take].copy_from_slice(&bytes[..take]);

    Some(SampleLine { header: RecordHeader { key, flags, crc, body_size }, body_seed })
}

fn write_record(out: &mut impl Write, sample: &SampleLine) -> io::Result<()> {
    let mut header = [0u8; RecordHeader::SIZE];
    sample.header.encode(&mut header);
    out.write_all(&header)?;

    let mut rng = Mt19937GenRand32::new(sample.body_seed as u32);
    let mut left = sample.header.body_size;
    while left > 0 {
        let mut block = [0u8; 1024];
        for qword in block.chunks_exact_mut(8) {
            let hi = u64::from(rng.next_u32());
            let lo = u64::from(rng.next_u32());
            qword.copy_from_slice(&((hi << 32) | lo).to_ne_bytes());
        }
        let take = left.min(1024) as usize;
        out.write_all(&block[..take])?;
        left -= take as u64;
    }
    Ok(())
}

fn main() -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = BufWriter::with_capacity(1 << 20, stdout.lock());

    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        match parse_line(&line) {
            Some(sample) => write_record(&mut out, &sample).context("writing record")?,
            None => {
                if !line.trim().is_empty() {
                    eprintln!("Line ignored");
                }
            }
        }
    }
    out.flush().context("flushing stdout")?;
    Ok(())
}
