use call_activity_bridge::phone::normalize;
use call_activity_bridge::signature::{sign_legacy, verify_provider_signature};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_normalize(c: &mut Criterion) {
    let inputs = ["(313) 555-1234", "+13135551234", "1-313-555-1234", "555-1234"];

    c.bench_function("phone.normalize.mixed", |b| {
        b.iter(|| {
            for raw in inputs {
                black_box(normalize(black_box(raw)));
            }
        });
    });
}

fn bench_legacy_signature(c: &mut Criterion) {
    let body = br#"{"call_id":6543210987,"state":"hangup","direction":"inbound"}"#;
    let signature = sign_legacy(body, "whsec");

    c.bench_function("signature.legacy.verify", |b| {
        b.iter(|| verify_provider_signature(black_box(body), black_box(&signature), "whsec"));
    });
}

criterion_group!(benches, bench_normalize, bench_legacy_signature);
criterion_main!(benches);
