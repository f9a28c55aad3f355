//! Authentication and authorization system.
//!
//! # Authentication Methods
//!
//! Two ways of presenting the same JWT session token:
//!
//! - **Session cookie**: browser-based auth. Users log in via
//!   `/authentication/login` with email/password and receive a secure
//!   HTTP-only cookie holding the token.
//! - **Bearer token**: programmatic access. The same JWT is accepted in an
//!   `Authorization: Bearer <token>` header.
//!
//! Tokens are stateless (HS256-signed claims); logout clears the cookie.
//!
//! # Authorization
//!
//! Access control is role-based: each of the five roles (admin, moderator,
//! agency, caregiver, guardian) maps to a set of (resource, operation)
//! permissions, where operations come in `*All` and `*Own` flavors. Handlers
//! declare their coarse requirement with the [`permissions::RequiresPermission`]
//! extractor and perform ownership checks (own job, own escrow, own patient)
//! afterwards.
//!
//! # Modules
//!
//! - [`current_user`]: Extractor for getting the authenticated user in handlers
//! - [`password`]: Password hashing and verification using Argon2
//! - [`permissions`]: Permission checking and access control logic
//! - [`session`]: JWT session token creation and verification

pub mod current_user;
pub mod password;
pub mod permissions;
pub mod session;
