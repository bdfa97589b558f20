use criterion::{criterion_group, criterion_main, Criterion};
use failsense_core::{
    build_view, derive_facets, AnalysisResult, DateRange, Fix, HistoryFilter, HistoryId,
    HistoryItem, MAX_HISTORY_LIMIT,
};

const BENCH_NOW: i64 = 1_760_000_000_000;

fn mk_item(index: usize) -> HistoryItem {
    let error_type = match index % 4 {
        0 => "ZeroDivisionError",
        1 => "dependency",
        2 => "syntax",
        _ => "runtime",
    };
    let offset = i64::try_from(index).unwrap_or(0) * 3_600_000;

    HistoryItem {
        id: HistoryId(format!("bench-{index}")),
        timestamp: BENCH_NOW - offset,
        code: format!("Traceback (most recent call last):\n  File \"job_{index}.py\"\n{error_type}"),
        result: AnalysisResult {
            root_cause: format!("benchmark root cause {index}"),
            error_type: error_type.to_string(),
            fixes: (0..3)
                .map(|rank| Fix {
                    fix: format!("Apply remedy {rank} for {error_type}"),
                    confidence: 0.9 - f64::from(rank) * 0.1,
                    explanation: "benchmark fixture".to_string(),
                    feedback: None,
                })
                .collect(),
            explanation: "benchmark explanation".to_string(),
        },
        language: "python".to_string(),
        worked_fix_index: None,
        tags: Some(vec![format!("team-{}", index % 5), "bench".to_string()]),
    }
}

fn bench_filter(c: &mut Criterion) {
    let items = (0..MAX_HISTORY_LIMIT).map(mk_item).collect::<Vec<_>>();
    let filter = HistoryFilter::default()
        .with_text("remedy 2")
        .with_error_type("error")
        .with_date_range(DateRange::Week)
        .with_tag("team-0");

    c.bench_function("history_view_full_filter_max_capacity", |b| {
        b.iter(|| {
            let view = build_view(&items, &filter, BENCH_NOW);
            if view.total != items.len() {
                panic!("benchmark view lost items: {}", view.total);
            }
        });
    });
}

fn bench_facets(c: &mut Criterion) {
    let items = (0..MAX_HISTORY_LIMIT).map(mk_item).collect::<Vec<_>>();

    c.bench_function("history_facets_max_capacity", |b| {
        b.iter(|| {
            let facets = derive_facets(&items);
            if facets.unique_error_types.is_empty() {
                panic!("benchmark facets are empty");
            }
        });
    });
}

criterion_group!(filter_benches, bench_filter, bench_facets);
criterion_main!(filter_benches);
