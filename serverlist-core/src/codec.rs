//! Payload encoding for the shared record: a JSON array of member records.

use crate::error::CodecError;
use crate::membership::MembershipList;

/// Serialize the list into the bytes stored under the record's key.
pub fn encode(list: &MembershipList) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(list)?)
}

/// Parse a payload read from the store.
///
/// A literal `null` decodes to an empty list; older writers stored an empty
/// list that way.
pub fn decode(bytes: &[u8]) -> Result<MembershipList, CodecError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(CodecError::Empty);
    }
    let list: Option<MembershipList> = serde_json::from_slice(bytes)?;
    Ok(list.unwrap_or_default())
}
