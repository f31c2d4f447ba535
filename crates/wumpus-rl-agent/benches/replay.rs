//! Benchmark for one DQN training step
//!
//! Measures `DQNAgent::replay` on the default 10x10 state size and
//! `ReplayBuffer::sample` on its own.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array1;
use rand::{rngs::StdRng, SeedableRng};

use wumpus_rl_agent::{DQNAgent, DQNConfig, ReplayBuffer};
use wumpus_rl_core::{AgentConfig, Transition};

const STATE_DIM: usize = 128;

#[allow(clippy::cast_precision_loss)]
fn transition(i: usize) -> Transition {
    let x = (i % 97) as f32 / 97.0;
    Transition::new(
        Array1::from_elem(STATE_DIM, x),
        i % 5,
        x,
        Array1::from_elem(STATE_DIM, 1.0 - x),
        i % 13 == 0,
    )
}

fn bench_replay_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("dqn_replay");

    for batch_size in [32, 64, 128] {
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| {
                let mut agent = DQNAgent::new(DQNConfig {
                    base: AgentConfig {
                        batch_size,
                        ..AgentConfig::default()
                    },
                    seed: Some(0),
                    ..DQNConfig::default()
                })
                .unwrap();
                for i in 0..1_000 {
                    let t = transition(i);
                    agent.remember(
                        t.state().clone(),
                        t.action(),
                        t.reward(),
                        t.next_state().clone(),
                        t.done(),
                    );
                }

                b.iter(|| black_box(agent.replay().unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_buffer_sample(c: &mut Criterion) {
    let mut buffer = ReplayBuffer::new(10_000);
    for i in 0..10_000 {
        buffer.push(transition(i));
    }
    let mut rng = StdRng::seed_from_u64(0);

    c.bench_function("buffer_sample_64", |b| {
        b.iter(|| black_box(buffer.sample(64, &mut rng).unwrap().len()));
    });
}

criterion_group!(benches, bench_replay_step, bench_buffer_sample);
criterion_main!(benches);
