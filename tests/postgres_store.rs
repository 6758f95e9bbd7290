//! Runs against a real Postgres when TEST_DATABASE_URL is set.

mod common;

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

use common::{date, lists};
use sandwich_stats::db::Database;
use sandwich_stats::query::chart::{ChartRequest, Interval};
use sandwich_stats::query::filter::{AmountRange, BundleFilter, DateRange, FilterRequest, RouterClass};
use sandwich_stats::query::ident::{Ident, TableNames};
use sandwich_stats::query::listing::{Listing, SearchCriteria, SortBy};
use sandwich_stats::query::stats::{SandwichStats, Stats};
use sandwich_stats::service::SandwichService;

const SCHEMA: &str = "sandwich_stats_test";

async fn setup() -> Option<(Database, SandwichService)> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return None;
    };
    let pool = PgPoolOptions::new().max_connections(4).connect(&url).await.unwrap();
    let db = Database::from_pool(pool);

    sqlx::query(&format!("DROP SCHEMA IF EXISTS \"{SCHEMA}\" CASCADE"))
        .execute(db.pool())
        .await
        .unwrap();
    let tables = TableNames::with_schema(SCHEMA).unwrap();
    db.run_migrations(&Ident::new(SCHEMA).unwrap(), &tables).await.unwrap();
    seed(&db, &tables).await;

    let service = SandwichService::new(Arc::new(db.clone()), tables, lists());
    Some((db, service))
}

const CUSTOM_ROUTER: &str = "0x000000000000000000000000000000000000dead";
/// USDT as some ingestion paths store it, checksummed.
const USDT_MIXED_CASE: &str = "0x55d398326f99059fF775485246999027B3197955";

struct Attack {
    id: i64,
    block: i64,
    token: &'static str,
    amount: &'static str,
    router: &'static str,
    bundle: bool,
}

async fn insert_block(db: &Database, tables: &TableNames, day: &str, n: i64, builder: Option<&str>, has_sandwich: bool) {
    let builder = builder.map(|b| format!("'{b}'")).unwrap_or_else(|| "NULL".to_string());
    sqlx::query(&format!(
        "INSERT INTO {} (block_number, has_sandwich, block_time, builder_name) \
         VALUES ({n}, {has_sandwich}, TIMESTAMPTZ '{day} 00:00:00+00' + INTERVAL '{} hours', {builder})",
        tables.overview,
        n % 100
    ))
    .execute(db.pool())
    .await
    .unwrap();
}

async fn insert_attack(db: &Database, tables: &TableNames, day: &str, attack: Attack) {
    let Attack {
        id,
        block,
        token,
        amount,
        router,
        bundle,
    } = attack;
    sqlx::query(&format!(
        "INSERT INTO {} (id, block_number, block_time, front_tx_hash, front_to, victim_tx_hash, \
         profit_amount, profit_token, is_bundle, bundle_size) \
         VALUES ({id}, {block}, TIMESTAMPTZ '{day} 00:00:00+00' + INTERVAL '{} hours', \
         '0xfront{id}', '{router}', '0xvictim{id}', {amount}, '{token}', {bundle}, 3)",
        tables.attack,
        block % 100
    ))
    .execute(db.pool())
    .await
    .unwrap();
    for seq in [1, 0] {
        sqlx::query(&format!(
            "INSERT INTO {} (attack_id, tx_hash, seq) VALUES ({id}, '0xback{id}_{seq}', {seq})",
            tables.backrun
        ))
        .execute(db.pool())
        .await
        .unwrap();
    }
}

/// 2024-01-10: ten blocks, one per hour. Blocks 2, 3 and 5 carry bundled
/// sandwiches routed through a public router.
///
/// 2024-01-11: blocks 101 to 104 with mixed tokens, routers and bundle flags.
async fn seed(db: &Database, tables: &TableNames) {
    let day = "2024-01-10";
    for n in 1..=10_i64 {
        let builder = match n {
            1..=4 => Some("titan"),
            5..=7 => Some("rsync"),
            _ => None,
        };
        insert_block(db, tables, day, n, builder, matches!(n, 2 | 3 | 5)).await;
    }
    for (id, block, token) in [(1, 2, common::USDT), (2, 3, common::WBNB), (3, 5, common::USDT)] {
        let attack = Attack {
            id,
            block,
            token,
            amount: "25000000000000000000",
            router: common::PANCAKE_V2,
            bundle: true,
        };
        insert_attack(db, tables, day, attack).await;
    }

    let day = "2024-01-11";
    insert_block(db, tables, day, 101, Some("titan"), true).await;
    insert_block(db, tables, day, 102, Some("titan"), true).await;
    insert_block(db, tables, day, 103, Some("rsync"), true).await;
    insert_block(db, tables, day, 104, None, false).await;
    let attacks = [
        Attack {
            id: 11,
            block: 101,
            token: common::USDT,
            amount: "60000000000000000000",
            router: common::PANCAKE_V2,
            bundle: true,
        },
        Attack {
            id: 12,
            block: 102,
            token: common::WBNB,
            amount: "40000000000000000000",
            router: CUSTOM_ROUTER,
            bundle: false,
        },
        Attack {
            id: 13,
            block: 103,
            token: USDT_MIXED_CASE,
            amount: "5000000000000000000",
            router: CUSTOM_ROUTER,
            bundle: false,
        },
    ];
    for attack in attacks {
        insert_attack(db, tables, day, attack).await;
    }
}

fn tenth() -> DateRange {
    DateRange::resolve(Some(date("2024-01-10")), Some(date("2024-01-10")), date("2024-02-01"))
}

fn eleventh() -> DateRange {
    DateRange::resolve(Some(date("2024-01-11")), Some(date("2024-01-11")), date("2024-02-01"))
}

fn overall(stats: Stats) -> SandwichStats {
    match stats {
        Stats::Overall(stats) => stats,
        Stats::Builder(_) => panic!("expected overall stats"),
    }
}

// One test, so the shared schema is never seeded concurrently.
#[tokio::test]
async fn postgres_end_to_end() {
    let Some((_db, service)) = setup().await else {
        return;
    };

    let fast = overall(service.get_sandwich_stats(&FilterRequest::new(tenth())).await.unwrap());
    assert_eq!(fast.total_blocks, 10);
    assert_eq!(fast.builder_blocks, 7);
    assert_eq!(fast.sandwich_blocks, 3);
    assert_eq!(fast.sandwich_builder_blocks, 3);
    assert_eq!(fast.earliest_block, Some(1));
    assert_eq!(fast.latest_block, Some(10));
    // titan 2/4 ahead of rsync 1/3
    assert_eq!(fast.builder_breakdown[0].builder_name, "titan");
    assert_eq!(fast.builder_breakdown[0].total_profit_stable, 25.0);
    assert_eq!(fast.builder_breakdown[0].total_profit_native, "25000000000000000000");

    // Every attack is bundled and routed publicly, so the filtered path must
    // agree with the flag.
    let all_bundled = FilterRequest::new(tenth())
        .with_bundle(BundleFilter::Bundle)
        .with_router(RouterClass::Public);
    let filtered = overall(service.get_sandwich_stats(&all_bundled).await.unwrap());
    assert_eq!(filtered.total_blocks, fast.total_blocks);
    assert_eq!(filtered.sandwich_blocks, fast.sandwich_blocks);
    assert_eq!(filtered.builder_breakdown, fast.builder_breakdown);

    let none = overall(
        service
            .get_sandwich_stats(&FilterRequest::new(tenth()).with_bundle(BundleFilter::NonBundle))
            .await
            .unwrap(),
    );
    assert_eq!(none.total_blocks, 10);
    assert_eq!(none.sandwich_blocks, 0);

    match service
        .get_sandwich_stats(&FilterRequest::new(tenth()).with_builder("rsync"))
        .await
        .unwrap()
    {
        Stats::Builder(stats) => {
            assert_eq!(stats.total_blocks, 3);
            assert_eq!(stats.sandwich_blocks, 1);
        }
        Stats::Overall(_) => panic!("expected builder stats"),
    }

    let chart = service
        .get_chart_data(&ChartRequest::new(Interval::Hourly, FilterRequest::new(tenth())))
        .await
        .unwrap();
    assert_eq!(chart.builders.len(), 2);
    assert_eq!(chart.summary.total_blocks, 10);
    assert_eq!(chart.summary.total_sandwiches, 3);
    assert!(chart.data.contains_key("2024-01-10T02:00:00Z"));

    let snapshot = service
        .get_chart_data(
            &ChartRequest::new(Interval::Daily, FilterRequest::new(tenth())).with_snapshot(Some(3)),
        )
        .await
        .unwrap();
    assert_eq!(snapshot.summary.total_blocks, 3);

    let Listing::Page(page) = service
        .get_builder_sandwiches("titan", None, None, Some(date("2024-01-10")), Some(date("2024-01-10")))
        .await
        .unwrap()
    else {
        panic!("expected a page");
    };
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].block_number, 3);
    assert_eq!(page.items[0].backrun_tx_hashes, ["0xback2_0", "0xback2_1"]);

    let criteria = SearchCriteria::new(Some("0xvictim3"), FilterRequest::new(tenth()));
    let Listing::Page(page) = service
        .search_sandwiches(&criteria, None, None, SortBy::Newest)
        .await
        .unwrap()
    else {
        panic!("expected a page");
    };
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].builder_name.as_deref(), Some("rsync"));

    // Mixed day: amount, router and bundle filters against real rows
    let stats = |request: FilterRequest| {
        let service = &service;
        async move { overall(service.get_sandwich_stats(&request).await.unwrap()) }
    };

    let fast = stats(FilterRequest::new(eleventh())).await;
    assert_eq!(fast.total_blocks, 4);
    assert_eq!(fast.sandwich_blocks, 3);
    // Both builders sandwiched every block; titan has more of them
    let titan = &fast.builder_breakdown[0];
    assert_eq!(titan.builder_name, "titan");
    assert_eq!(titan.total_profit_stable, 60.0);
    assert_eq!(titan.total_profit_native, "40000000000000000000");

    // Only stable-token profit of at least 10 whole tokens
    let at_least_ten = stats(FilterRequest::new(eleventh()).with_amount(AmountRange::parse(Some("10"), None))).await;
    assert_eq!(at_least_ten.total_blocks, 4);
    assert_eq!(at_least_ten.sandwich_blocks, 1);
    let names: Vec<_> = at_least_ten.builder_breakdown.iter().map(|b| b.builder_name.as_str()).collect();
    assert_eq!(names, ["titan", "rsync"]);
    let titan = &at_least_ten.builder_breakdown[0];
    assert_eq!(titan.sandwich_blocks, 1);
    assert_eq!(titan.total_profit_stable, 60.0);
    assert_eq!(titan.total_profit_native, "0");
    let rsync = &at_least_ten.builder_breakdown[1];
    assert_eq!(rsync.sandwich_blocks, 0);
    assert!(rsync.total_profit_stable.is_sign_positive());

    // Token case in the attack row does not matter
    let at_most_six = stats(FilterRequest::new(eleventh()).with_amount(AmountRange::parse(None, Some("6")))).await;
    assert_eq!(at_most_six.sandwich_blocks, 1);
    assert_eq!(at_most_six.builder_breakdown[0].builder_name, "rsync");
    assert_eq!(at_most_six.builder_breakdown[0].total_profit_stable, 5.0);

    let customized = stats(FilterRequest::new(eleventh()).with_router(RouterClass::Customized)).await;
    assert_eq!(customized.sandwich_blocks, 2);
    let public = stats(FilterRequest::new(eleventh()).with_router(RouterClass::Public)).await;
    assert_eq!(public.sandwich_blocks, 1);
    assert!(public.sandwich_blocks <= fast.sandwich_blocks);
    assert!(customized.sandwich_blocks <= fast.sandwich_blocks);

    let chart = |bundle: BundleFilter| {
        let service = &service;
        let request = ChartRequest::new(Interval::Daily, FilterRequest::new(eleventh()).with_bundle(bundle));
        async move { service.get_chart_data(&request).await.unwrap() }
    };
    let bundled = chart(BundleFilter::Bundle).await;
    let bucket = &bundled.data["2024-01-11T00:00:00Z"];
    assert_eq!(bucket.overall_total, 4);
    assert_eq!(bucket.overall_sandwiches, 1);
    assert_eq!(bucket.builders["titan"].sandwiches, 1);
    assert_eq!(bucket.builders["rsync"].sandwiches, 0);

    let unbundled = chart(BundleFilter::NonBundle).await;
    assert_eq!(unbundled.summary.total_sandwiches, 2);
    assert_eq!(unbundled.data["2024-01-11T00:00:00Z"].builders["rsync"].sandwiches, 1);
}
