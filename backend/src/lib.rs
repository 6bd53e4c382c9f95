//! 承包商门户认证后端
//!
//! 基于 TOTP 一次性密码的登录、以账户为单位的验证限流和 JWT 认证。

pub mod cli;
pub mod config;
pub mod otp_auth;
pub mod server;
