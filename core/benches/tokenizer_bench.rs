use criterion::{criterion_group, criterion_main, Criterion};
use quarry_core::Analyzer;

const SAMPLE: &str = "An experimental study of a wing in a propeller slipstream was \
made in order to determine the spanwise distribution of the lift increase due to \
slipstream at different angles of attack of the wing and at different free stream \
to slipstream velocity ratios. The results were intended in part as an evaluation \
basis for different theoretical treatments of this problem.";

fn bench_analyze(c: &mut Criterion) {
    let analyzer = Analyzer::default();
    let text = SAMPLE.repeat(32);
    c.bench_function("analyze_abstract", |b| b.iter(|| analyzer.analyze(&text)));
}

criterion_group!(benches, bench_analyze);
criterion_main!(benches);
