use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use sales_analyzer::aggregate::aggregate;
use sales_analyzer::ingest::{IngestOptions, ingest};
use sales_analyzer::report;

const PRODUCTS: [&str; 3] = ["Car", "Bike", "Truck"];
const NAMES: [&str; 6] = ["Shyam", "Anita", "Rahul", "Preeti", "John", "Sara"];

fn generate_sales_csv(rows: usize) -> String {
    let mut csv = String::from("Name,Product Name,Sales,Date\n");
    for i in 0..rows {
        let product = PRODUCTS[i % PRODUCTS.len()];
        let name = NAMES[i % NAMES.len()];
        let cents = 10_000 + (i * 7_919) % 90_000;
        let month = (i % 12) + 1;
        let day = (i % 28) + 1;
        csv.push_str(&format!(
            "{name},{product},{}.{:02},2024-{month:02}-{day:02}\n",
            cents / 100,
            cents % 100
        ));
    }
    csv
}

fn bench_pipeline(c: &mut Criterion) {
    let csv = generate_sales_csv(50_000);
    let options = IngestOptions::default();

    c.bench_function("ingest_csv_50k", |b| {
        b.iter(|| ingest("bench.csv", csv.as_bytes(), &options).expect("ingest"))
    });

    let records = ingest("bench.csv", csv.as_bytes(), &options).expect("ingest");
    c.bench_function("aggregate_50k", |b| {
        b.iter(|| aggregate(&records).expect("aggregate"))
    });

    c.bench_function("export_xlsx", |b| {
        b.iter_batched(
            || aggregate(&records).expect("aggregate"),
            |result| report::to_xlsx(&result).expect("xlsx"),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
