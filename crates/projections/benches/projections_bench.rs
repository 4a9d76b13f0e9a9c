use common::AggregateId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    AccountId, DetailId, Money, OrderLine, OrderService, PlaceOrder, ProductId, SellerTransition,
};
use event_store::InMemoryEventStore;
use projections::{OrderBoardView, Projection, ProjectionProcessor};

/// Places `n` two-seller orders and confirms one side of each.
async fn populate_store(store: &InMemoryEventStore, n: usize) {
    let service = OrderService::new(store.clone());
    for _ in 0..n {
        let (a, b) = (AccountId::new(), AccountId::new());
        let order_id = AggregateId::new();
        let lines = [a, b]
            .into_iter()
            .map(|seller| OrderLine {
                detail_id: DetailId::new(),
                product_id: ProductId::new("box"),
                product_name: "Box".to_string(),
                unit_price: Money::new(10_000),
                image: None,
                quantity: 1,
                seller,
            })
            .collect();
        service
            .place_order(PlaceOrder::new(
                order_id,
                AccountId::new(),
                lines,
                Money::new(20_000),
            ))
            .await
            .unwrap();
        service
            .advance(order_id, a, SellerTransition::Confirm)
            .await
            .unwrap();
    }
}

fn bench_catch_up(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    for orders in [100, 1000] {
        let store = InMemoryEventStore::new();
        rt.block_on(populate_store(&store, orders));

        c.bench_function(&format!("projections/catch_up_{orders}_orders"), |b| {
            b.iter(|| {
                rt.block_on(async {
                    let view = OrderBoardView::new();
                    let mut processor = ProjectionProcessor::new(store.clone());
                    processor.register(Box::new(view.clone()) as Box<dyn Projection>);
                    processor.run_catch_up().await.unwrap();
                });
            });
        });
    }
}

fn bench_stale_scan(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let view = OrderBoardView::new();
    rt.block_on(async {
        populate_store(&store, 1000).await;
        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(Box::new(view.clone()));
        processor.run_catch_up().await.unwrap();
    });

    c.bench_function("projections/stale_scan_1000_orders", |b| {
        b.iter(|| {
            rt.block_on(async {
                view.stale(domain::OrderStatus::Processing, chrono::Utc::now())
                    .await
            })
        });
    });
}

criterion_group!(benches, bench_catch_up, bench_stale_scan);
criterion_main!(benches);
