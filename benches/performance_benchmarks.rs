use chrono::{Duration as ChronoDuration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::thread;

use nymity::client::MessageCache;
use nymity::domain::MessageView;
use nymity::middleware::{RateLimitConfig, RateLimiter};

fn view(i: usize) -> MessageView {
    MessageView {
        id: format!("msg-{}", i),
        content: format!("content {}", i),
        created_at: Utc::now() - ChronoDuration::seconds(i as i64),
    }
}

fn benchmark_rate_limiter(c: &mut Criterion) {
    let limiter = RateLimiter::new(RateLimitConfig {
        max_requests: 100,
        window_size: 60,
        ..RateLimitConfig::default()
    });

    c.bench_function("rate_limit_check_single_key", |b| {
        b.iter(|| limiter.check(black_box("203.0.113.1")))
    });

    c.bench_function("rate_limit_check_many_keys", |b| {
        let mut i = 0u32;
        b.iter(|| {
            i = i.wrapping_add(1);
            limiter.check(&format!("10.0.{}.{}", (i >> 8) & 0xff, i & 0xff))
        })
    });

    let whitelisted = RateLimiter::new(RateLimitConfig {
        whitelist: vec!["127.0.0.1".into(), "10.*".into()],
        ..RateLimitConfig::default()
    });
    c.bench_function("rate_limit_whitelist_match", |b| {
        b.iter(|| whitelisted.check(black_box("10.1.2.3")))
    });
}

fn benchmark_rate_limiter_concurrent(c: &mut Criterion) {
    for thread_count in [2, 4, 8].iter() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));

        c.bench_function(&format!("rate_limit_concurrent_{}_threads", thread_count), |b| {
            b.iter(|| {
                let handles: Vec<_> = (0..*thread_count)
                    .map(|t| {
                        let limiter = Arc::clone(&limiter);
                        thread::spawn(move || {
                            for j in 0..100 {
                                limiter.check(&format!("192.0.2.{}:{}", t, j % 10));
                            }
                        })
                    })
                    .collect();

                for handle in handles {
                    handle.join().unwrap();
                }
            })
        });
    }
}

fn benchmark_cache_merge(c: &mut Criterion) {
    let snapshot: Vec<MessageView> = (0..500).map(view).collect();

    c.bench_function("cache_replace_all_500", |b| {
        b.iter(|| {
            let mut cache = MessageCache::new();
            let ticket = cache.begin_fetch();
            for i in 500..520 {
                cache.insert_one(view(i));
            }
            cache.replace_all(ticket, black_box(snapshot.clone()));
        })
    });

    c.bench_function("cache_render_500", |b| {
        let mut cache = MessageCache::new();
        let ticket = cache.begin_fetch();
        cache.replace_all(ticket, snapshot.clone());
        b.iter(|| black_box(cache.messages()))
    });

    c.bench_function("cache_remove_and_restore", |b| {
        let mut cache = MessageCache::new();
        let ticket = cache.begin_fetch();
        cache.replace_all(ticket, snapshot.clone());
        b.iter(|| {
            if let Some(removed) = cache.remove_by_id(black_box("msg-250")) {
                cache.restore(removed);
            }
        })
    });
}

criterion_group!(
    benches,
    benchmark_rate_limiter,
    benchmark_rate_limiter_concurrent,
    benchmark_cache_merge
);
criterion_main!(benches);
