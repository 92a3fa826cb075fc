use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, ResponseError,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::comm::AppConfiguration;
use crate::error::AppError;

/// 限流配置
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// 每个时间窗口允许的最大请求数
    pub max_requests: u32,
    /// 时间窗口大小（秒）
    pub window_size: u64,
    /// 是否启用限流
    pub enabled: bool,
    /// 白名单，支持 `*` 通配
    pub whitelist: Vec<String>,
    /// 可信代理，支持 `*` 通配；只有来自这些对端的转发头才被采信
    pub trusted_proxies: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window_size: 60,
            enabled: true,
            whitelist: Vec::new(),
            trusted_proxies: Vec::new(),
        }
    }
}

impl From<&AppConfiguration> for RateLimitConfig {
    fn from(c: &AppConfiguration) -> Self {
        Self {
            max_requests: c.rate_limit_max_requests,
            window_size: c.rate_limit_window_seconds,
            enabled: c.rate_limit_enabled,
            whitelist: c.rate_limit_whitelist.clone(),
            trusted_proxies: c.rate_limit_trusted_proxies.clone(),
        }
    }
}

/// 地址规则（白名单、可信代理）
#[derive(Debug)]
enum AddressPattern {
    Exact(String),
    Pattern(Regex),
}

impl AddressPattern {
    fn parse(raw: &str) -> Option<Self> {
        if !raw.contains('*') {
            return Some(Self::Exact(raw.to_string()));
        }
        let pattern = format!("^{}$", regex::escape(raw).replace(r"\*", ".*"));
        match Regex::new(&pattern) {
            Ok(re) => Some(Self::Pattern(re)),
            Err(e) => {
                warn!("忽略无效的地址规则 {}: {}", raw, e);
                None
            }
        }
    }

    fn matches(&self, key: &str) -> bool {
        match self {
            Self::Exact(ip) => ip == key,
            Self::Pattern(re) => re.is_match(key),
        }
    }
}

/// 一次限流检查的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// 每个键在窗口内已接受请求的时间戳
type RateLimitStore = Arc<Mutex<HashMap<String, VecDeque<Instant>>>>;

/// 滑动窗口限流器，克隆后共享同一份计数
/// Sliding-window limiter; clones share the same counters
#[derive(Clone)]
pub struct RateLimiter {
    store: RateLimitStore,
    config: Arc<RateLimitConfig>,
    whitelist: Arc<Vec<AddressPattern>>,
    trusted_proxies: Arc<Vec<AddressPattern>>,
}

fn parse_patterns(raw: &[String]) -> Vec<AddressPattern> {
    raw.iter().filter_map(|r| AddressPattern::parse(r)).collect()
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let whitelist = parse_patterns(&config.whitelist);
        let trusted_proxies = parse_patterns(&config.trusted_proxies);
        Self {
            store: Arc::new(Mutex::new(HashMap::new())),
            config: Arc::new(config),
            whitelist: Arc::new(whitelist),
            trusted_proxies: Arc::new(trusted_proxies),
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_size)
    }

    /// 检查IP是否在白名单中
    fn is_whitelisted(&self, key: &str) -> bool {
        self.whitelist.iter().any(|entry| entry.matches(key))
    }

    fn is_trusted_proxy(&self, addr: &str) -> bool {
        self.trusted_proxies.iter().any(|entry| entry.matches(addr))
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    /// 在给定时刻检查并记录一次请求
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        if !self.config.enabled || self.is_whitelisted(key) {
            return RateLimitDecision::Allowed {
                remaining: self.config.max_requests,
            };
        }

        let window = self.window();
        let mut store = self.store.lock();
        let stamps = store.entry(key.to_string()).or_default();

        while let Some(oldest) = stamps.front() {
            if now.saturating_duration_since(*oldest) >= window {
                stamps.pop_front();
            } else {
                break;
            }
        }

        if stamps.len() as u32 >= self.config.max_requests {
            let oldest = stamps.front().copied().unwrap_or(now);
            let retry_after = (oldest + window).saturating_duration_since(now);
            return RateLimitDecision::Limited { retry_after };
        }

        stamps.push_back(now);
        RateLimitDecision::Allowed {
            remaining: self.config.max_requests - stamps.len() as u32,
        }
    }

    /// 清理窗口外已无请求记录的键
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Instant::now())
    }

    pub fn cleanup_expired_at(&self, now: Instant) -> usize {
        let window = self.window();
        let mut store = self.store.lock();
        let before = store.len();
        store.retain(|_, stamps| {
            stamps
                .back()
                .map(|last| now.saturating_duration_since(*last) < window)
                .unwrap_or(false)
        });
        before - store.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.lock().len()
    }
}

/// 获取客户端地址
///
/// 对端不是可信代理时直接使用对端 IP，转发头一律忽略。对端是可信代理时依次采信
/// X-Forwarded-For（从右向左第一个非可信代理的地址）、X-Real-IP、Forwarded for=。
pub fn client_key(req: &ServiceRequest, limiter: &RateLimiter) -> String {
    let peer = match req.peer_addr() {
        Some(addr) => addr.ip().to_string(),
        None => return "unknown".to_string(),
    };
    if !limiter.is_trusted_proxy(&peer) {
        return peer;
    }

    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    if let Some(forwarded_for) = header("X-Forwarded-For") {
        let hops: Vec<&str> = forwarded_for
            .split(',')
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
            .collect();
        let client = hops
            .iter()
            .rev()
            .find(|hop| !limiter.is_trusted_proxy(hop))
            .or_else(|| hops.first());
        if let Some(client) = client {
            return client.to_string();
        }
    }

    if let Some(real_ip) = header("X-Real-IP") {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    if let Some(forwarded) = header("Forwarded") {
        // for=192.0.2.60;proto=http;by=203.0.113.43
        for part in forwarded.split(|c| c == ';' || c == ',') {
            if let Some(ip) = part.trim().strip_prefix("for=") {
                return ip.trim_matches('"').to_string();
            }
        }
    }

    peer
}

/// 限流中间件
pub struct RateLimitMiddleware {
    limiter: Option<RateLimiter>,
}

impl RateLimitMiddleware {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limiter: Some(RateLimiter::new(config)),
        }
    }

    /// 使用指定的限流器
    pub fn with_limiter(limiter: RateLimiter) -> Self {
        Self {
            limiter: Some(limiter),
        }
    }

    /// 使用 `web::Data<RateLimiter>` 中的共享限流器（多个 worker 共用计数）
    pub fn shared() -> Self {
        Self { limiter: None }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: Option<RateLimiter>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let limiter = self.limiter.clone().or_else(|| {
            req.app_data::<web::Data<RateLimiter>>()
                .map(|data| data.get_ref().clone())
        });

        Box::pin(async move {
            let Some(limiter) = limiter else {
                error!("未注册共享限流器: {}", req.path());
                let error = AppError::Internal(anyhow::anyhow!("rate limiter not configured"));
                return Ok(req.into_response(error.error_response()));
            };

            let key = client_key(&req, &limiter);
            debug!("限流检查: {} 访问 {}", key, req.path());

            match limiter.check(&key) {
                RateLimitDecision::Allowed { remaining } => {
                    debug!("限流通过: {} 剩余 {} 次请求", key, remaining);
                    let response = service.call(req).await?;
                    Ok(response.map_into_boxed_body())
                }
                RateLimitDecision::Limited { retry_after } => {
                    warn!("限流拒绝: {} 超过限制", key);
                    // 向上取整，至少 1 秒
                    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                    let error = AppError::RateLimited {
                        retry_after_secs: secs.max(1),
                    };
                    Ok(req.into_response(error.error_response()))
                }
            }
        })
    }
}
