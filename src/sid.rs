use std::io::Cursor;

use log::trace;
use winstructs::security::Sid;

/// Best-effort SID-to-account translation. Implementations never fail
/// loudly; an unknown SID is simply not translated.
pub trait AccountLookup {
    /// Translates a binary SID to `(domain, name)`.
    fn lookup_account(&self, sid: &[u8]) -> Option<(String, String)>;
}

/// An `AccountLookup` that never resolves anything. Useful where account
/// enrichment is not wanted (e.g. reading a backup log from another host).
pub struct NoAccountLookup;

impl AccountLookup for NoAccountLookup {
    fn lookup_account(&self, _sid: &[u8]) -> Option<(String, String)> {
        None
    }
}

/// Decodes the `S-1-…` string form of a binary SID.
pub fn sid_string(sid_bytes: &[u8]) -> Option<String> {
    let mut cursor = Cursor::new(sid_bytes);
    match Sid::from_reader(&mut cursor) {
        Ok(sid) => Some(sid.to_string()),
        Err(err) => {
            trace!("undecodable SID ({} bytes): {err}", sid_bytes.len());
            None
        }
    }
}

/// Resolves a record's embedded SID to its string form and, best-effort, a
/// `domain\name` account string.
///
/// A zero-length SID means "no user" and short-circuits without touching
/// the lookup; decode or lookup failures degrade to `None` rather than
/// erroring.
pub fn resolve_sid(
    sid_bytes: &[u8],
    accounts: &dyn AccountLookup,
) -> (Option<String>, Option<String>) {
    if sid_bytes.is_empty() {
        return (None, None);
    }

    let string_form = sid_string(sid_bytes);

    let user = accounts.lookup_account(sid_bytes).map(|(domain, name)| {
        if domain.is_empty() {
            name
        } else {
            format!("{domain}\\{name}")
        }
    });

    (string_form, user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// S-1-5-18 (LocalSystem): revision 1, one sub-authority, NT authority.
    const LOCAL_SYSTEM: [u8; 12] = [1, 1, 0, 0, 0, 0, 0, 5, 18, 0, 0, 0];

    struct KnownAccounts;

    impl AccountLookup for KnownAccounts {
        fn lookup_account(&self, sid: &[u8]) -> Option<(String, String)> {
            (sid == LOCAL_SYSTEM)
                .then(|| ("NT AUTHORITY".to_string(), "SYSTEM".to_string()))
        }
    }

    #[test]
    fn empty_sid_is_no_user() {
        assert_eq!(resolve_sid(&[], &KnownAccounts), (None, None));
    }

    #[test]
    fn known_sid_resolves_to_domain_and_name() {
        let (string_form, user) = resolve_sid(&LOCAL_SYSTEM, &KnownAccounts);

        assert_eq!(string_form.as_deref(), Some("S-1-5-18"));
        assert_eq!(user.as_deref(), Some(r"NT AUTHORITY\SYSTEM"));
    }

    #[test]
    fn lookup_failure_degrades_to_no_user() {
        let sid = [1, 1, 0, 0, 0, 0, 0, 5, 19, 0, 0, 0];
        let (string_form, user) = resolve_sid(&sid, &KnownAccounts);

        assert_eq!(string_form.as_deref(), Some("S-1-5-19"));
        assert_eq!(user, None);
    }

    #[test]
    fn garbage_sid_bytes_do_not_panic() {
        let (string_form, user) = resolve_sid(&[0xFF], &NoAccountLookup);

        assert_eq!(string_form, None);
        assert_eq!(user, None);
    }
}
