#![allow(clippy::many_single_char_names)]

/// murmurhash2_gc over the UTF-16 code units of `input`, rendered in base 36.
///
/// Stable across runs, platforms and modules, so the same declaration always
/// lands on the same class name.
pub fn hash(input: &str) -> String {
  hash_with_seed(input, 0)
}

fn hash_with_seed(input: &str, seed: u32) -> String {
  let units: Vec<u16> = input.encode_utf16().collect();
  to_base36(murmur2_gc(&units, seed))
}

/// The first `len` characters of [`hash`].
pub fn short_hash(input: &str, len: usize) -> String {
  hash(input).chars().take(len).collect()
}

fn murmur2_gc(units: &[u16], seed: u32) -> u32 {
  let mut h = seed ^ (units.len() as u32);
  let mut chunks = units.chunks_exact(4);

  for chunk in &mut chunks {
    let k = (chunk[0] as u32 & 0xff)
      | ((chunk[1] as u32 & 0xff) << 8)
      | ((chunk[2] as u32 & 0xff) << 16)
      | ((chunk[3] as u32 & 0xff) << 24);
    h = mul_mix(h) ^ mix_k(k);
  }

  let tail = chunks.remainder();
  if !tail.is_empty() {
    for (index, unit) in tail.iter().enumerate().rev() {
      h ^= (*unit as u32 & 0xff) << (8 * index);
    }
    h = mul_mix(h);
  }

  h ^= h >> 13;
  h = mul_mix(h);
  h ^ (h >> 15)
}

#[inline]
fn mix_k(value: u32) -> u32 {
  let mut v = mul_mix(value);
  v ^= v >> 24;
  mul_mix(v)
}

#[inline]
fn mul_mix(value: u32) -> u32 {
  let low = (value & 0xffff).wrapping_mul(0x5bd1e995);
  let high = ((value >> 16) & 0xffff).wrapping_mul(0x5bd1e995);
  low.wrapping_add(high << 16)
}

fn to_base36(mut value: u32) -> String {
  const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

  if value == 0 {
    return "0".to_string();
  }

  let mut digits = Vec::with_capacity(7);
  while value > 0 {
    digits.push(DIGITS[(value % 36) as usize] as char);
    value /= 36;
  }
  digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn matches_known_hashes() {
    assert_eq!(hash("compiled"), "3mvezc");
    assert_eq!(hash("css"), "12w0n9j");
    assert_eq!(hash("keyframes"), "1hp1jho");
    assert_eq!(hash_with_seed("compiled", 1), "yzbs45");
  }

  #[test]
  fn hashes_declaration_groups() {
    assert_eq!(hash("undefined&font-size"), "1wyb1t4");
    assert_eq!(hash("12px"), "1fwxnve");
    assert_eq!(short_hash("undefined&color", 4), "syaz");
  }

  #[test]
  fn empty_input_is_stable() {
    assert_eq!(hash(""), hash(""));
  }
}
