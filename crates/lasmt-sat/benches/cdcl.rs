use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lasmt_sat::{Literal, Solver, Variable};

fn pigeonhole(pigeons: u32, holes: u32) -> Solver {
    let var = |i: u32, h: u32| Variable(i * holes + h);
    let mut solver = Solver::new((pigeons * holes) as usize);
    for i in 0..pigeons {
        solver.add_clause((0..holes).map(|h| Literal::positive(var(i, h))).collect());
    }
    for h in 0..holes {
        for i in 0..pigeons {
            for k in (i + 1)..pigeons {
                solver.add_clause(vec![
                    Literal::negative(var(i, h)),
                    Literal::negative(var(k, h)),
                ]);
            }
        }
    }
    solver
}

fn bench_pigeonhole(c: &mut Criterion) {
    c.bench_function("pigeonhole_6_5", |b| {
        b.iter(|| {
            let mut solver = pigeonhole(6, 5);
            black_box(solver.solve())
        })
    });
}

fn bench_lookahead_cubes(c: &mut Criterion) {
    c.bench_function("lookahead_cubes_depth3", |b| {
        b.iter(|| {
            let mut solver = pigeonhole(5, 5);
            black_box(solver.lookahead_cubes(3))
        })
    });
}

criterion_group!(benches, bench_pigeonhole, bench_lookahead_cubes);
criterion_main!(benches);
