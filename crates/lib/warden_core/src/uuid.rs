// Refresh tokens and login records are append-only and read back newest
// first, so their ids are generated app-side as UUIDv7.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}
