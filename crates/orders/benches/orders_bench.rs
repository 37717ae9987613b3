use common::Money;
use criterion::{Criterion, criterion_group, criterion_main};
use orders::{CartItem, CreateOrder, OrderService};
use store::{InMemoryStore, NewProduct, NewUser, ProductRecord, Storage, UserRecord};

fn seed(rt: &tokio::runtime::Runtime, store: &InMemoryStore) -> (UserRecord, Vec<ProductRecord>) {
    rt.block_on(async {
        let user = store
            .insert_user(NewUser::new("bench@example.com", "secret"))
            .await
            .unwrap();
        let mut products = Vec::new();
        for i in 0..5 {
            let product = store
                .insert_product(NewProduct::new(
                    format!("Product {i}"),
                    Money::from_cents(1000 + i),
                    i32::MAX,
                ))
                .await
                .unwrap();
            products.push(product);
        }
        (user, products)
    })
}

fn bench_create_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let (user, products) = seed(&rt, &store);
    let service = OrderService::new(store);

    c.bench_function("orders/create_single_line", |b| {
        b.iter(|| {
            rt.block_on(async {
                let cmd = CreateOrder::new(user.id, vec![CartItem::new(products[0].id, 1)]);
                service.create_order(cmd).await.unwrap();
            });
        });
    });

    c.bench_function("orders/create_five_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                let items = products.iter().map(|p| CartItem::new(p.id, 1)).collect();
                service
                    .create_order(CreateOrder::new(user.id, items))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_create_and_cancel(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let (user, products) = seed(&rt, &store);
    let service = OrderService::new(store);

    c.bench_function("orders/create_then_cancel", |b| {
        b.iter(|| {
            rt.block_on(async {
                let items = products.iter().map(|p| CartItem::new(p.id, 2)).collect();
                let placed = service
                    .create_order(CreateOrder::new(user.id, items))
                    .await
                    .unwrap();
                service.cancel_order(placed.order_id).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_create_order, bench_create_and_cancel);
criterion_main!(benches);
