/// Router Module Index
///
/// Routes are split by the access they require. Access control is applied
/// per module as an Axum layer in `create_router`, never inside handlers.

/// Routes open to everyone, signed in or not.
pub mod public;

/// Routes that need an attached identity of any role.
pub mod authenticated;

/// Routes restricted to the `editor` role.
pub mod editor;

/// Sign-in and sign-out. Mounted outside token resolution, so a stale cookie
/// cannot block either.
pub mod session;
