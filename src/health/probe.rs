//! 探针实现
//!
//! 探针只负责回答“这个组件现在是否健康”，返回 `Ok(())` 表示健康，
//! 返回错误表示失败。超时、崩溃捕获和状态迁移由检查器负责。

use crate::error::{HealthVitalsError, Result};
use crate::health::context::CheckContext;
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// 探针trait，定义单个组件的健康检测接口
#[async_trait]
pub trait Probe: Send + Sync {
    /// 执行一次探测
    ///
    /// # 参数
    /// * `ctx` - 检查上下文，超时后其取消令牌会被触发
    ///
    /// # 返回
    /// * `anyhow::Result<()>` - `Ok(())` 表示健康
    async fn check(&self, ctx: &CheckContext) -> anyhow::Result<()>;
}

/// 闭包探针
pub struct FnProbe<F>(F);

#[async_trait]
impl<F, Fut> Probe for FnProbe<F>
where
    F: Fn(CheckContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn check(&self, ctx: &CheckContext) -> anyhow::Result<()> {
        (self.0)(ctx.clone()).await
    }
}

/// 用异步闭包创建探针
///
/// ```no_run
/// use health_vitals::health::probe_fn;
///
/// let probe = probe_fn(|_ctx| async { Ok(()) });
/// ```
pub fn probe_fn<F, Fut>(f: F) -> Arc<dyn Probe>
where
    F: Fn(CheckContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnProbe(f))
}

/// HTTP探针，请求URL并校验响应状态码
#[derive(Debug, Clone)]
pub struct HttpProbe {
    /// HTTP客户端
    client: Client,
    /// 目标URL
    url: String,
    /// HTTP方法
    method: Method,
    /// 期望的状态码列表
    expected_status_codes: Vec<u16>,
    /// 请求头
    headers: HashMap<String, String>,
    /// 请求体（用于POST/PUT请求）
    body: Option<serde_json::Value>,
}

impl HttpProbe {
    /// 创建新的HTTP探针，默认 `GET` 并期望 `200`
    ///
    /// 超时由检查器统一控制，这里的客户端不设置请求超时。
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()
            .map_err(|e| HealthVitalsError::Other(e.into()))?;

        Ok(Self {
            client,
            url: url.into(),
            method: Method::GET,
            expected_status_codes: vec![200],
            headers: HashMap::new(),
            body: None,
        })
    }

    /// 设置HTTP方法
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// 设置期望的状态码
    pub fn with_expected_status_codes(mut self, codes: Vec<u16>) -> Self {
        self.expected_status_codes = codes;
        self
    }

    /// 添加请求头
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// 设置JSON请求体
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// 目标URL
    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_request(&self) -> reqwest::RequestBuilder {
        let mut request = self.client.request(self.method.clone(), &self.url);

        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        if let Some(body) = &self.body {
            request = request.json(body);
        }

        request
    }

    fn validate_status_code(&self, status_code: u16) -> bool {
        self.expected_status_codes.contains(&status_code)
    }

    /// 格式化请求错误信息，使其更加清晰易读
    fn format_request_error(error: &reqwest::Error) -> String {
        if error.is_timeout() {
            "Request timeout".to_string()
        } else if error.is_connect() {
            "Connection refused".to_string()
        } else if error.is_request() {
            "Invalid request".to_string()
        } else if error.is_decode() {
            "Response decode error".to_string()
        } else {
            let error_str = error.to_string();
            if error_str.contains("dns") || error_str.contains("DNS") {
                "DNS resolution failed".to_string()
            } else if error_str.contains("certificate")
                || error_str.contains("tls")
                || error_str.contains("ssl")
            {
                "SSL/TLS certificate error".to_string()
            } else {
                format!("Request failed: {}", error_str)
            }
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, ctx: &CheckContext) -> anyhow::Result<()> {
        let request = self.build_request();

        let response = tokio::select! {
            biased;
            _ = ctx.cancelled() => anyhow::bail!("Request cancelled"),
            response = request.send() => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => anyhow::bail!(Self::format_request_error(&e)),
        };

        let status = response.status();
        if self.validate_status_code(status.as_u16()) {
            Ok(())
        } else {
            anyhow::bail!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )
        }
    }
}
