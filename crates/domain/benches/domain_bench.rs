use chrono::Utc;
use common::AggregateId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    AccountId, Aggregate, DetailId, FulfillmentStage, Money, OrderLine, OrderService,
    OrderStatus, PlaceOrder, ProductId, ProposalId, TradePost, aggregate_status,
};
use event_store::InMemoryEventStore;

fn bench_aggregate_status(c: &mut Criterion) {
    let stages: Vec<FulfillmentStage> = (0..200)
        .map(|i| match i % 5 {
            0 => FulfillmentStage::Pending,
            1 => FulfillmentStage::Confirmed,
            2 => FulfillmentStage::Processing,
            3 => FulfillmentStage::Completed,
            _ => FulfillmentStage::Cancelled,
        })
        .collect();

    c.bench_function("domain/aggregate_status_200_details", |b| {
        b.iter(|| {
            let status = aggregate_status(stages.iter().copied());
            assert_eq!(status, OrderStatus::PartiallyCompleted);
        });
    });
}

fn bench_place_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let sellers: Vec<AccountId> = (0..5).map(|_| AccountId::new()).collect();

    c.bench_function("domain/place_order_20_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                let service = OrderService::new(InMemoryEventStore::new());
                let lines = (0..20)
                    .map(|i| OrderLine {
                        detail_id: DetailId::new(),
                        product_id: ProductId::new(format!("box-{i}")),
                        product_name: format!("Box {i}"),
                        unit_price: Money::new(10_000),
                        image: None,
                        quantity: 1,
                        seller: sellers[i % sellers.len()],
                    })
                    .collect();
                let cmd = PlaceOrder::new(
                    AggregateId::new(),
                    AccountId::new(),
                    lines,
                    Money::new(200_000),
                );
                service.place_order(cmd).await.unwrap();
            });
        });
    });
}

/// A post with one long negotiation chain, rejected near its root.
fn bench_reject_cascade(c: &mut Criterion) {
    let author = AccountId::new();
    let proposer = AccountId::new();
    let now = Utc::now();

    let mut post = TradePost::default();
    let events = post
        .create(
            AggregateId::new(),
            author,
            ProductId::new("opened"),
            "Bench post",
            None,
            now,
        )
        .unwrap();
    post.apply_events(events);

    let root = ProposalId::new();
    let events = post
        .propose(root, proposer, vec![ProductId::new("x")], None, now)
        .unwrap();
    post.apply_events(events);

    let mut last = root;
    for i in 0..200 {
        let actor = if i % 2 == 0 { author } else { proposer };
        let next = ProposalId::new();
        let events = post
            .counter(last, next, actor, vec![ProductId::new("y")], None, now)
            .unwrap();
        post.apply_events(events);
        last = next;
    }

    c.bench_function("domain/reject_cascade_200_chain", |b| {
        b.iter(|| {
            let events = post.reject(root, proposer, now).unwrap();
            assert_eq!(events.len(), 1);
        });
    });
}

criterion_group!(
    benches,
    bench_aggregate_status,
    bench_place_order,
    bench_reject_cascade,
);
criterion_main!(benches);
