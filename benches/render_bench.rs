use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use iq_workbench::domains::message::{Message, Role};
use iq_workbench::normalizer::normalize;
use iq_workbench::render::html::conversation_html;
use iq_workbench::render::render_conversation;
use iq_workbench::render::terminal::conversation_lines;

const REPLY: &str = "Here is **Dijkstra's algorithm** in Python:\\n\\n\
def dijkstra(graph, source):\n    dist = {source: 0}\n    queue = [(0, source)]\n    return dist\n\n\
It runs in `O((V + E) log V)`.\n\n- uses a heap\n- skips stale entries\n\n> keep edge weights non-negative";

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");

    group.bench_function(BenchmarkId::new("normalize", REPLY.len()), |b| {
        b.iter(|| normalize(REPLY))
    });

    // Simulates re-rendering after every streamed fragment.
    for fragment in [8usize, 32] {
        group.bench_function(BenchmarkId::new("stream_rerender", fragment), |b| {
            b.iter(|| {
                let mut messages = vec![
                    Message::new(1, Role::User, "Write code to demonstrate dijkstra's algorithm", 0),
                    Message::new(2, Role::Assistant, "", 0),
                ];
                let mut end = 0;
                while end < REPLY.len() {
                    end = (end + fragment).min(REPLY.len());
                    while !REPLY.is_char_boundary(end) {
                        end += 1;
                    }
                    messages[1].content = REPLY[..end].to_string();
                    let view = render_conversation(&messages, true);
                    let _ = conversation_lines(&view);
                }
            })
        });
    }

    group.bench_function("conversation_html", |b| {
        let messages = vec![
            Message::new(1, Role::User, "hi", 0),
            Message::new(2, Role::Assistant, REPLY, 0),
        ];
        b.iter(|| conversation_html(&render_conversation(&messages, false)))
    });

    group.finish();
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
