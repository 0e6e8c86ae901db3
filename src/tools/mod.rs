//! 外部工具：注册表、`/tool` 指令解析、带超时/重试/白名单的执行器，以及内置工具

pub mod current_time;
pub mod directive;
pub mod echo;
pub mod executor;
pub mod registry;
pub mod schema;

pub use current_time::CurrentTimeTool;
pub use directive::{is_tool_directive, parse_tool_directive, ToolDirective};
pub use echo::EchoTool;
pub use executor::{ToolExecutor, DEFAULT_TOOL_TIMEOUT_MS};
pub use registry::{ExternalTool, ToolDescriptor, ToolRegistry};
