// Data models — Rust structs that map to cache-store rows.
//
// Kept separate from the query/schema modules so callers can use them
// without depending on rusqlite directly (same separation the teacher
// keeps between `db/models.rs` and `db/queries.rs`).

/// A cached remote actor (spec §3 "Account").
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    /// Locally-assigned dense integer key, assigned by the store.
    pub uid: i64,
    /// Globally unique remote identifier, e.g. `did:plc:...`.
    pub did: String,
    pub handle: String,
    pub nick: String,
    pub desc: String,
    pub followers: i64,
    pub following: i64,
    /// True iff outbound expansion (both directions) has completed once.
    pub fetched: bool,
    /// Crawl round the account was first discovered at (spec §4.4 "Depth").
    /// Seeds are depth 0; an account found while expanding a depth-`d` seed's
    /// graph is tagged `d + 1`. Set once, on first insert, like every other
    /// profile field.
    pub depth: u32,
}

/// A profile as resolved from the remote, prior to `uid` assignment.
#[derive(Debug, Clone, Default)]
pub struct ProfileInput {
    pub did: String,
    pub handle: String,
    pub nick: String,
    pub desc: String,
    pub followers: i64,
    pub following: i64,
}

/// A directed follow edge: `from_uid` follows `to_uid` (spec §3 "Edge").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from_uid: i64,
    pub to_uid: i64,
}
