//! 시장 데이터 조회 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 케이프타운 주택 6개월 시장 데이터 조회
//! comps fetch -l "Cape Town"
//!
//! # 업스트림 호출 없이 저장된 데이터만 조회
//! comps cached -l "Cape Town" -p apartment --period 1year
//!
//! # 구성 요소 상태 점검
//! comps health --probe
//!
//! # 데이터베이스 마이그레이션
//! comps migrate
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use comps_core::{init_logging, DataPeriod, MarketDataRequest};
use comps_data::{Database, PostgresStore, RedisCache};
use comps_origin::{CircuitBreaker, HttpOriginClient};
use comps_service::{AppConfig, MarketDataService, RateLimiter, TracingAuditSink};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "comps")]
#[command(about = "Market comps CLI - 지역별 부동산 시장 데이터 조회", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일 경로
    #[arg(short, long, global = true, default_value = "config/default.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 시장 데이터 조회 (캐시 → 저장소 → 업스트림)
    Fetch {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// 저장된 시장 데이터만 조회 (업스트림 호출 없음)
    Cached {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// 저장소, 캐시, 업스트림 상태 점검
    Health {
        /// 업스트림 probe 포함
        #[arg(long, default_value = "false")]
        probe: bool,
    },

    /// 데이터베이스 마이그레이션 실행
    Migrate,
}

#[derive(clap::Args)]
struct QueryArgs {
    /// 지역명 (예: "Cape Town")
    #[arg(short, long)]
    location: String,

    /// 매물 유형 (기본: 설정의 default_property_type)
    #[arg(short, long)]
    property_type: Option<String>,

    /// 집계 기간 (3months, 6months, 1year)
    #[arg(long)]
    period: Option<DataPeriod>,

    /// 통계를 함께 출력
    #[arg(long, default_value = "false")]
    stats: bool,
}

impl QueryArgs {
    fn to_request(&self) -> MarketDataRequest {
        MarketDataRequest {
            location: self.location.clone(),
            property_type: self.property_type.clone(),
            period: self.period,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = AppConfig::load(Some(&cli.config))
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    // 로깅 초기화
    init_logging(&config.logging.clone().overridden_by_env())
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    match cli.command {
        Commands::Fetch { query } => {
            let service = build_service(&config).await?;
            match service.get_market_data(&query.to_request()).await {
                Ok(response) => {
                    info!(source = %response.source, "Market data retrieved");
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
                Err(e) => {
                    error!(kind = e.kind(), "Fetch failed: {}", e);
                    return Err(e.into());
                }
            }
            if query.stats {
                println!("{}", serde_json::to_string_pretty(&service.stats())?);
            }
        }

        Commands::Cached { query } => {
            let service = build_service(&config).await?;
            match service.get_cached_market_data(&query.to_request()).await {
                Ok(response) => {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
                Err(e) if e.is_not_found() => {
                    println!("저장된 시장 데이터가 없습니다: {}", e);
                }
                Err(e) => {
                    error!(kind = e.kind(), "Cached lookup failed: {}", e);
                    return Err(e.into());
                }
            }
            if query.stats {
                println!("{}", serde_json::to_string_pretty(&service.stats())?);
            }
        }

        Commands::Health { probe } => {
            config.service.origin_probe |= probe;
            let service = build_service(&config).await?;
            let report = service.health_report().await;

            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_healthy() {
                return Err(anyhow!("One or more components are unhealthy"));
            }
        }

        Commands::Migrate => {
            let db = Database::connect(&config.database)
                .await
                .context("Failed to connect to database")?;
            db.migrate().await.context("Migration failed")?;
            println!("마이그레이션 완료");
        }
    }

    Ok(())
}

/// 설정으로부터 서비스와 의존성을 구성합니다.
async fn build_service(config: &AppConfig) -> anyhow::Result<MarketDataService> {
    let db = Database::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    let store = Arc::new(PostgresStore::new(db.pool().clone()));

    let cache = Arc::new(
        RedisCache::connect(&config.redis)
            .await
            .context("Failed to connect to Redis")?,
    );

    let origin = Arc::new(
        HttpOriginClient::new(config.origin.clone()).context("Failed to build origin client")?,
    );

    let breaker = Arc::new(CircuitBreaker::new(
        config.origin.source_name.clone(),
        config.circuit_breaker.clone(),
    ));
    let rate_limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));

    let service = MarketDataService::new(
        cache,
        store,
        origin,
        rate_limiter,
        breaker,
        config.service_config(),
    )
    .with_audit_sink(Arc::new(TracingAuditSink));

    Ok(service)
}
