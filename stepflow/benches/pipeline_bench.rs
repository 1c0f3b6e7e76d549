//! Benchmarks for pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use stepflow::cancellation::{CancelScope, CancellationToken};
use stepflow::pipeline::{PipelineConfig, Supervisor};
use stepflow::signals::NoSignals;
use stepflow::testing::FakeLauncher;

fn pipeline_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let config = PipelineConfig::default();

    c.bench_function("runner_four_fake_steps", |b| {
        let pipeline = config
            .build(Path::new("/proj"))
            .unwrap()
            .with_launcher(Arc::new(FakeLauncher::new()));
        b.iter(|| {
            let mut out = Vec::with_capacity(128);
            runtime
                .block_on(async {
                    let scope = CancelScope::with_timeout(
                        Arc::new(CancellationToken::new()),
                        Duration::from_secs(60),
                    );
                    pipeline.run(&scope, &mut out).await
                })
                .unwrap();
            black_box(out)
        });
    });

    c.bench_function("supervised_four_fake_steps", |b| {
        let pipeline = config
            .build(Path::new("/proj"))
            .unwrap()
            .with_launcher(Arc::new(FakeLauncher::new()));
        let supervisor = Supervisor::new(pipeline);
        b.iter(|| {
            let mut out = Vec::with_capacity(128);
            runtime
                .block_on(supervisor.run_with_signals(NoSignals, &mut out))
                .unwrap();
            black_box(out)
        });
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
