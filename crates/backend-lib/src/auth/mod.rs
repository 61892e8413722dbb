// ============================
// kabuport-backend-lib/src/auth/mod.rs
// ============================
//! Authentication module.

pub mod current_user;
pub mod session;
mod service;
mod supabase;

pub use current_user::{CurrentUser, ResolvedUser};
pub use session::{StoredSession, MAX_CHUNK_SIZE};
pub use service::{AuthError, AuthService, Resolution, VerifiedSession};
pub use supabase::SupabaseAuth;
