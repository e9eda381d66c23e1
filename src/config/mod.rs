//! 配置模块
//!
//! 每个逻辑库一份配置，注册时严格校验，不提供自动修复

pub mod strict;

pub use strict::{
    Config, ConfigBuilder, ConfigError, DEFAULT_HOST_RESOLVE_TIMEOUT, DEFAULT_STARTUP_TIMEOUT,
};
