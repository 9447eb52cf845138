//! Size bounds enforced on relay frames and signal payloads.
//!
//! String lengths are counted in characters, not bytes.

pub const MAX_TRANSFER_ID_LEN: usize = 128;
pub const MAX_TOKEN_LEN: usize = 256;

/// Upper bound for an offer or answer SDP.
pub const MAX_SDP_LEN: usize = 200_000;
pub const MAX_CANDIDATE_LEN: usize = 4_000;
pub const MAX_ERROR_CODE_LEN: usize = 64;
/// Shared by the `error` signal message and the `cancel` reason.
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}
