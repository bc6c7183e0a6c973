//! 工具接口与注册表
//!
//! 模型通过工具名请求调用，注册表按名字查找并执行。
//! 工具名是与模型之间的协议，改名需同步修改系统提示词。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult, BusinessError};
use crate::infrastructure::llm::ToolSpec;

/// 工具执行结果
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    /// 结构化结果（JSON 对象）
    pub data: Value,
    /// 一行可读摘要，进入调用记录
    pub summary: String,
}

impl ToolOutcome {
    pub fn new(data: Value, summary: impl Into<String>) -> Self {
        Self {
            data,
            summary: summary.into(),
        }
    }

    /// 回传给模型的内容：结构化结果并入 `summary` 字段
    pub fn into_payload(self) -> Value {
        let mut object = match self.data {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        object.insert("summary".to_string(), Value::String(self.summary));
        Value::Object(object)
    }
}

/// 可供模型调用的工具
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 输入参数的 JSON Schema
    fn input_schema(&self) -> Value;

    /// 按模型给出的输入原样执行
    async fn invoke(&self, input: Value) -> AppResult<ToolOutcome>;
}

/// 把模型给出的输入解析为工具参数
pub fn parse_input<T: DeserializeOwned>(tool: &str, input: Value) -> AppResult<T> {
    // 模型不传参数时可能给出 null
    let input = if input.is_null() {
        Value::Object(Map::new())
    } else {
        input
    };
    serde_json::from_value(input)
        .map_err(|e| AppError::invalid_input(format!("{} 的参数无效: {}", tool, e)))
}

/// 工具注册表
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具，同名覆盖
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// 全部工具的声明，按名字排序
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// 执行工具
    ///
    /// # 错误
    /// 未注册的工具名返回 `UnknownTool`
    pub async fn execute(&self, name: &str, input: Value) -> AppResult<ToolOutcome> {
        let tool = self
            .get(name)
            .ok_or_else(|| AppError::Business(BusinessError::UnknownTool(name.to_string())))?;
        tool.invoke(input).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
