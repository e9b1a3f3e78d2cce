/*
 * Copyright (c) 2024-2025 Elide Technologies, Inc.
 *
 * Licensed under the MIT license (the "License"); you may not use this file except in compliance
 * with the License. You may obtain a copy of the License at
 *
 *   https://opensource.org/license/mit/
 *
 * Unless required by applicable law or agreed to in writing, software distributed under the License is distributed on
 * an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied. See the
 * License for the specific language governing permissions and limitations under the License.
 */

use crc32fast::Hasher as CRC32;

/// Length of the frame check sequence trailer, in bytes.
pub const FCS_LEN: usize = 4;

/// Compute the CRC32 checksum of the given data.
///
/// This function is a wrapper around the `crc32fast` crate. The computed
/// checksum is the standard reflected CRC-32 (polynomial 0x04C11DB7, initial
/// value 0xFFFFFFFF, final XOR 0xFFFFFFFF) used as the frame check sequence
/// on the air.
///
/// # Arguments
/// * `data` - The data to compute the checksum of.
///
/// # Returns
/// The CRC32 checksum of the data.
///
/// # Examples
///
/// ```
/// use base::crc::crc32;
/// let data = b"hello, world!";
/// let checksum = crc32(data);
/// assert_eq!(checksum, 1486392595);
/// ```
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
  let mut hasher = CRC32::new();
  hasher.update(data);
  hasher.finalize()
}

/// Append the little-endian CRC32 of `data` to it, forming a PSDU with a
/// valid frame check sequence trailer.
///
/// # Examples
///
/// ```
/// use base::crc::{append_fcs, verify_fcs};
/// let psdu = append_fcs(vec![0xde, 0xad, 0xbe, 0xef]);
/// assert_eq!(psdu.len(), 8);
/// assert!(verify_fcs(&psdu));
/// ```
pub fn append_fcs(mut data: Vec<u8>) -> Vec<u8> {
  let fcs = crc32(&data);
  data.extend_from_slice(&fcs.to_le_bytes());
  data
}

/// Check that the last four bytes of `psdu` are the little-endian CRC32 of
/// everything before them. Anything shorter than the trailer fails.
pub fn verify_fcs(psdu: &[u8]) -> bool {
  if psdu.len() < FCS_LEN {
    return false;
  }
  let (body, trailer) = psdu.split_at(psdu.len() - FCS_LEN);
  crc32(body).to_le_bytes() == trailer
}
