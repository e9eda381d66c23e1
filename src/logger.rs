//! 解析器专用日志系统
//!
//! 基于 tracing-subscriber，提供带颜色与图标的日志输出，以及可在运行时开关的调试日志

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use chrono::Local;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

pub use tracing_subscriber::filter::LevelFilter;

/// 确保日志器只初始化一次
static INIT: Once = Once::new();

/// 调试日志开关，默认关闭
static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// 打开调试日志（实例解析与健康检查的详细过程）
pub fn enable_debug() {
    DEBUG_ENABLED.store(true, Ordering::Relaxed);
}

/// 关闭调试日志
pub fn disable_debug() {
    DEBUG_ENABLED.store(false, Ordering::Relaxed);
}

/// 调试日志是否打开
pub fn debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// 解析器日志格式
#[derive(Debug, Default, Clone, Copy)]
pub struct ResolverFormat;

impl<S, N> FormatEvent<S, N> for ResolverFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let level = *event.metadata().level();

        let (level_color, level_bg, level_icon) = match level {
            Level::ERROR => ("\x1b[97m", "\x1b[41m", "🚫"), // 白字红底
            Level::WARN => ("\x1b[30m", "\x1b[43m", "⚠️ "), // 黑字黄底
            Level::INFO => ("\x1b[97m", "\x1b[42m", "🗄️ "), // 白字绿底
            Level::DEBUG => ("\x1b[30m", "\x1b[46m", "🔍"), // 黑字青底
            _ => ("\x1b[97m", "\x1b[45m", "📡"), // 白字紫底
        };

        let timestamp_color = "\x1b[90m";
        let message_color = "\x1b[37m";
        let reset = "\x1b[0m";

        write!(
            writer,
            "{}{} {}{}{:5}{} {} {}",
            timestamp_color,
            Local::now().format("%H:%M:%S%.3f"),
            level_color,
            level_bg,
            level,
            reset,
            level_icon,
            message_color
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer, "{}", reset)
    }
}

/// 以 `level` 为默认级别，`directives` 中按模块给出的级别优先
fn build_filter(directives: Option<&str>, level: LevelFilter) -> EnvFilter {
    EnvFilter::new(directives.unwrap_or_default()).add_directive(level.into())
}

/// 初始化解析器日志系统（线程安全，重复调用不生效）
///
/// # Arguments
/// * `level` - 默认日志级别，传入 `LevelFilter::OFF` 可禁用日志；`RUST_LOG` 可再按模块调整
///
/// # Example
/// ```
/// use rat_dbresolver::logger::{init_resolver_logger, LevelFilter};
///
/// init_resolver_logger(LevelFilter::INFO).unwrap();
/// ```
pub fn init_resolver_logger(
    level: LevelFilter,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut init_result = Ok(());
    INIT.call_once(|| {
        let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
        let filter = build_filter(env.as_deref(), level);
        init_result = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .event_format(ResolverFormat)
            .try_init();
    });
    init_result
}

/// 安全的日志初始化函数，默认禁用日志输出
pub fn init_resolver_logger_silent() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_resolver_logger(LevelFilter::OFF)
}

/// 信息日志
#[macro_export]
macro_rules! dbr_info {
    ($($arg:tt)*) => {
        $crate::info!($($arg)*)
    };
}

/// 警告日志
#[macro_export]
macro_rules! dbr_warn {
    ($($arg:tt)*) => {
        $crate::warn!($($arg)*)
    };
}

/// 错误日志
#[macro_export]
macro_rules! dbr_error {
    ($($arg:tt)*) => {
        $crate::error!($($arg)*)
    };
}

/// 调试日志，只在 [`enable_debug`] 之后输出
#[macro_export]
macro_rules! dbr_debug {
    ($($arg:tt)*) => {
        if $crate::logger::debug_enabled() {
            $crate::debug!($($arg)*);
        }
    };
}
