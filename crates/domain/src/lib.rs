//! 项目撮合平台核心领域模型
//!
//! 包含项目、申请、通知投递任务等核心实体，以及相关的业务规则和领域事件。

pub mod entities;
pub mod errors;
pub mod events;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use events::*;
pub use value_objects::*;
