//! 文档存储 - 基础设施层
//!
//! 对托管 NoSQL 存储的窄接口：按主键读取、全表扫描（可带过滤）、
//! 按二级索引查询、写入、条件更新、删除。
//!
//! 两个实现：
//! - [`MemoryDocumentStore`]：进程内存储，本地开发和测试使用
//! - [`HttpDocumentStore`]：通过 JSON REST 网关访问远端存储
//!
//! 本层不做任何业务判断，错误记录日志后原样返回。

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::error::StoreError;

// ========== 表结构声明 ==========

/// 二级索引声明
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: &'static str,
    pub partition_key: &'static str,
    pub sort_key: Option<&'static str>,
}

/// 表结构声明（不含前缀）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub entity: &'static str,
    pub key: &'static str,
    pub indexes: &'static [IndexSpec],
}

impl TableSpec {
    /// 加上表名前缀，得到可直接访问的表
    pub fn resolve(&self, prefix: &str) -> Table {
        Table {
            name: format!("{}-{}", prefix, self.entity),
            key: self.key,
            indexes: self.indexes,
        }
    }
}

/// 已解析表名的表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub key: &'static str,
    pub indexes: &'static [IndexSpec],
}

impl Table {
    fn index(&self, name: &str) -> Result<&IndexSpec, StoreError> {
        self.indexes
            .iter()
            .find(|idx| idx.name == name)
            .ok_or_else(|| StoreError::UnknownIndex {
                table: self.name.clone(),
                index: name.to_string(),
            })
    }

    fn key_of(&self, item: &Value) -> Result<String, StoreError> {
        match item.get(self.key) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(StoreError::MissingKey {
                table: self.name.clone(),
                key_field: self.key.to_string(),
            }),
        }
    }
}

// ========== 过滤条件 ==========

/// 单个过滤条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// 字段等于给定值
    Eq { attribute: String, value: Value },
    /// 字符串包含子串，或数组包含元素
    Contains {
        attribute: String,
        value: String,
        #[serde(default)]
        case_insensitive: bool,
    },
    /// 闭区间；字符串按字典序比较（适用于 `YYYY-MM-DD`）
    Between {
        attribute: String,
        low: Value,
        high: Value,
    },
}

impl Condition {
    pub fn matches(&self, item: &Value) -> bool {
        match self {
            Condition::Eq { attribute, value } => item.get(attribute) == Some(value),
            Condition::Contains {
                attribute,
                value,
                case_insensitive,
            } => {
                let needle = if *case_insensitive {
                    value.to_lowercase()
                } else {
                    value.clone()
                };
                let hit = |s: &str| {
                    if *case_insensitive {
                        s.to_lowercase().contains(&needle)
                    } else {
                        s.contains(&needle)
                    }
                };
                match item.get(attribute) {
                    Some(Value::String(s)) => hit(s),
                    Some(Value::Array(items)) => items.iter().any(|v| match v {
                        Value::String(s) if *case_insensitive => s.to_lowercase() == needle,
                        Value::String(s) => *s == needle,
                        _ => false,
                    }),
                    _ => false,
                }
            }
            Condition::Between {
                attribute,
                low,
                high,
            } => match item.get(attribute) {
                Some(v) => {
                    compare_values(Some(low), Some(v)) != Ordering::Greater
                        && compare_values(Some(v), Some(high)) != Ordering::Greater
                }
                None => false,
            },
        }
    }
}

/// AND 组合的过滤条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanFilter {
    pub conditions: Vec<Condition>,
}

impl ScanFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, attribute: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            attribute: attribute.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn contains(mut self, attribute: &str, value: &str) -> Self {
        self.conditions.push(Condition::Contains {
            attribute: attribute.to_string(),
            value: value.to_string(),
            case_insensitive: false,
        });
        self
    }

    pub fn contains_ignore_case(mut self, attribute: &str, value: &str) -> Self {
        self.conditions.push(Condition::Contains {
            attribute: attribute.to_string(),
            value: value.to_string(),
            case_insensitive: true,
        });
        self
    }

    pub fn between(mut self, attribute: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Between {
            attribute: attribute.to_string(),
            low: low.into(),
            high: high.into(),
        });
        self
    }

    pub fn matches(&self, item: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(item))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// 二级索引查询
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexQuery {
    pub index: String,
    pub partition_value: Value,
    #[serde(default)]
    pub filter: ScanFilter,
    /// 按排序键倒序（最新在前）
    #[serde(default)]
    pub descending: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl IndexQuery {
    pub fn new(index: &str, partition_value: impl Into<Value>) -> Self {
        Self {
            index: index.to_string(),
            partition_value: partition_value.into(),
            filter: ScanFilter::default(),
            descending: false,
            limit: None,
        }
    }

    pub fn with_filter(mut self, filter: ScanFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// 数字按数值、字符串按字典序比较；类型不同或缺失视为相等
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

// ========== 存储接口 ==========

/// 文档存储能力
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 按主键读取，不存在返回 `None`
    async fn get_item(&self, table: &Table, key: &str) -> Result<Option<Value>, StoreError>;

    /// 全表扫描，先过滤再截断
    async fn scan(
        &self,
        table: &Table,
        filter: &ScanFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Value>, StoreError>;

    /// 按二级索引的分区键查询
    async fn query_index(&self, table: &Table, query: &IndexQuery) -> Result<Vec<Value>, StoreError>;

    /// 写入（覆盖同主键记录）
    async fn put_item(&self, table: &Table, item: Value) -> Result<(), StoreError>;

    /// 条件更新：记录必须已存在，否则返回 [`StoreError::NotFound`]
    async fn update_item(
        &self,
        table: &Table,
        key: &str,
        attributes: Map<String, Value>,
    ) -> Result<Value, StoreError>;

    /// 按主键删除，记录不存在时静默成功
    async fn delete_item(&self, table: &Table, key: &str) -> Result<(), StoreError>;
}

// ========== 内存实现 ==========

/// 进程内文档存储
#[derive(Default)]
pub struct MemoryDocumentStore {
    tables: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 表中记录数
    pub async fn len(&self, table: &Table) -> usize {
        self.tables
            .read()
            .await
            .get(&table.name)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_item(&self, table: &Table, key: &str) -> Result<Option<Value>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.get(&table.name).and_then(|rows| rows.get(key)).cloned())
    }

    async fn scan(
        &self,
        table: &Table,
        filter: &ScanFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Value>, StoreError> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(&table.name)
            .into_iter()
            .flat_map(|rows| rows.values())
            .filter(|item| filter.matches(item))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn query_index(&self, table: &Table, query: &IndexQuery) -> Result<Vec<Value>, StoreError> {
        let index = table.index(&query.index)?;
        let tables = self.tables.read().await;
        let mut rows: Vec<Value> = tables
            .get(&table.name)
            .into_iter()
            .flat_map(|rows| rows.values())
            .filter(|item| item.get(index.partition_key) == Some(&query.partition_value))
            .filter(|item| query.filter.matches(item))
            .cloned()
            .collect();

        if let Some(sort_key) = index.sort_key {
            rows.sort_by(|a, b| compare_values(a.get(sort_key), b.get(sort_key)));
        }
        if query.descending {
            rows.reverse();
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn put_item(&self, table: &Table, item: Value) -> Result<(), StoreError> {
        let key = table.key_of(&item)?;
        let mut tables = self.tables.write().await;
        tables.entry(table.name.clone()).or_default().insert(key, item);
        Ok(())
    }

    async fn update_item(
        &self,
        table: &Table,
        key: &str,
        attributes: Map<String, Value>,
    ) -> Result<Value, StoreError> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .get_mut(&table.name)
            .and_then(|rows| rows.get_mut(key))
            .ok_or_else(|| StoreError::NotFound {
                table: table.name.clone(),
                key: key.to_string(),
            })?;

        if let Value::Object(fields) = existing {
            for (name, value) in attributes {
                fields.insert(name, value);
            }
        }
        Ok(existing.clone())
    }

    async fn delete_item(&self, table: &Table, key: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(rows) = tables.get_mut(&table.name) {
            rows.remove(key);
        }
        Ok(())
    }
}

// ========== HTTP 实现 ==========

#[derive(Debug, Deserialize)]
struct ItemsResponse {
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct ScanRequest<'a> {
    filter: &'a ScanFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct UpdateRequest {
    attributes: Map<String, Value>,
}

/// 通过 JSON REST 网关访问的文档存储
///
/// 路由约定：
/// - `GET|PUT|PATCH|DELETE /tables/{table}/items/{key}`
/// - `POST /tables/{table}/scan`
/// - `POST /tables/{table}/query`
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, table: &Table, segments: &[&str]) -> Result<reqwest::Url, StoreError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| StoreError::request_failed(&table.name, e))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::BadResponse {
                table: table.name.clone(),
                status: 0,
                body: format!("无效的存储地址: {}", self.base_url),
            })?
            .pop_if_empty()
            .extend(["tables", table.name.as_str()])
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        table: &Table,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, StoreError> {
        request.send().await.map_err(|e| {
            error!("❌ 存储请求失败 [{}]: {}", table.name, e);
            StoreError::request_failed(&table.name, e)
        })
    }

    async fn check(table: &Table, response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!("❌ 存储返回异常 [{}]: {} {}", table.name, status, body);
        Err(StoreError::BadResponse {
            table: table.name.clone(),
            status: status.as_u16(),
            body,
        })
    }

    async fn read_items(table: &Table, response: reqwest::Response) -> Result<Vec<Value>, StoreError> {
        let response = Self::check(table, response).await?;
        let parsed: ItemsResponse = response
            .json()
            .await
            .map_err(|e| StoreError::request_failed(&table.name, e))?;
        Ok(parsed.items)
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn get_item(&self, table: &Table, key: &str) -> Result<Option<Value>, StoreError> {
        let url = self.url(table, &["items", key])?;
        debug!("GET {}", url);
        let response = self.send(table, self.client.get(url)).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(table, response).await?;
        let item = response
            .json()
            .await
            .map_err(|e| StoreError::request_failed(&table.name, e))?;
        Ok(Some(item))
    }

    async fn scan(
        &self,
        table: &Table,
        filter: &ScanFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Value>, StoreError> {
        let url = self.url(table, &["scan"])?;
        debug!("POST {} ({} 个过滤条件)", url, filter.conditions.len());
        let body = ScanRequest { filter, limit };
        let response = self.send(table, self.client.post(url).json(&body)).await?;
        Self::read_items(table, response).await
    }

    async fn query_index(&self, table: &Table, query: &IndexQuery) -> Result<Vec<Value>, StoreError> {
        table.index(&query.index)?;
        let url = self.url(table, &["query"])?;
        debug!("POST {} (索引: {})", url, query.index);
        let response = self.send(table, self.client.post(url).json(query)).await?;
        Self::read_items(table, response).await
    }

    async fn put_item(&self, table: &Table, item: Value) -> Result<(), StoreError> {
        let key = table.key_of(&item)?;
        let url = self.url(table, &["items", &key])?;
        debug!("PUT {}", url);
        let response = self.send(table, self.client.put(url).json(&item)).await?;
        Self::check(table, response).await?;
        Ok(())
    }

    async fn update_item(
        &self,
        table: &Table,
        key: &str,
        attributes: Map<String, Value>,
    ) -> Result<Value, StoreError> {
        let url = self.url(table, &["items", key])?;
        debug!("PATCH {} ({} 个字段)", url, attributes.len());
        let body = UpdateRequest { attributes };
        let response = self.send(table, self.client.patch(url).json(&body)).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                table: table.name.clone(),
                key: key.to_string(),
            });
        }
        let response = Self::check(table, response).await?;
        response
            .json()
            .await
            .map_err(|e| StoreError::request_failed(&table.name, e))
    }

    async fn delete_item(&self, table: &Table, key: &str) -> Result<(), StoreError> {
        let url = self.url(table, &["items", key])?;
        debug!("DELETE {}", url);
        let response = self.send(table, self.client.delete(url)).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(table, response).await?;
        Ok(())
    }
}
