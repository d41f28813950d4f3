//! Interpolation engine benchmarks for hula.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hula_core::{Template, Value};
use tokio::runtime::Runtime;

fn literal_template(values: usize) -> Template {
    (0..values).fold(Template::new().text("<ul>"), |template, i| {
        template.text("<li>").value(i).text("</li>")
    })
}

fn deferred_template(values: usize) -> Template {
    (0..values).fold(Template::new().text("<ul>"), |template, i| {
        template
            .text("<li>")
            .value(Value::deferred(async move { Ok(format!("item {}", i)) }))
            .text("</li>")
    })
}

fn bench_interpolate(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("interpolate");

    for values in [1, 32, 512] {
        group.throughput(Throughput::Elements(values as u64));

        group.bench_with_input(BenchmarkId::new("text", values), &values, |b, &values| {
            b.iter(|| rt.block_on(literal_template(black_box(values)).resolve()).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("deferred", values), &values, |b, &values| {
            b.iter(|| rt.block_on(deferred_template(black_box(values)).resolve()).unwrap())
        });
    }

    group.finish();
}

fn bench_nested_lists(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("nested_lists", |b| {
        b.iter(|| {
            let rows: Value = (0..32)
                .map(|row| {
                    (0..8)
                        .map(|col| format!("<td>{}.{}</td>", row, col))
                        .collect::<Value>()
                })
                .collect();
            rt.block_on(Template::new().text("<table>").value(rows).text("</table>").resolve())
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_interpolate, bench_nested_lists);
criterion_main!(benches);
