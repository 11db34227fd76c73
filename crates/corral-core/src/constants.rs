//! Application-wide constants.

use uuid::Uuid;

/// Organization ID reserved for universal templates, visible to every
/// organization. Deterministic UUID distinct from `Uuid::nil()` so a zeroed
/// id can never alias the universal scope. Stable across deployments.
/// Format: 7c1a9f4e-2d8b-5a6c-9e0f-3b4d5c6e7f8a
pub const UNIVERSAL_ORGANIZATION_ID: Uuid = Uuid::from_u128(0x7c1a9f4e_2d8b_5a6c_9e0f_3b4d5c6e7f8a);

/// Invitation tokens are valid this many days after issue (and after resend).
pub const INVITE_EXPIRY_DAYS: i64 = 7;

/// Random bytes per invitation token; hex-encoded to twice this many chars.
pub const INVITE_TOKEN_BYTES: usize = 20;

/// TTL for cached permission resolutions.
pub const PERMISSION_CACHE_TTL_SECS: i64 = 300;

/// Bulk import keeps at most this many per-row errors in its report.
pub const IMPORT_ERROR_CAP: usize = 10;
