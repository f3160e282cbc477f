/// Router Module Index
///
/// Organizes the routes by the gate that protects them. Access control is applied at the
/// module level (Axum layers), never inside individual handlers.

/// Routes accessible to anonymous clients: setup, sign-in, health.
pub mod public;

/// Routes behind the session gate only (the caller's own account).
pub mod authenticated;

/// Routes behind the session gate and the `ManageUsers` feature gate.
pub mod admin;

/// Routes behind the session gate and the `AddEditContent` feature gate.
pub mod editor;
