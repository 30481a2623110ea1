pub mod fingerprint;
pub mod jid;

pub use fingerprint::{Fingerprint, FINGERPRINT_LEN};
pub use jid::{component_jid, split_userid, Jid, USER_HASH_LEN};
