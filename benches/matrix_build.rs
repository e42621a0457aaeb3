use criterion::{black_box, criterion_group, criterion_main, Criterion};

use groebner_f4::f4::MatrixBuilder;
use groebner_f4::{f4_simple, FpPolyRing, MonomialOrder, Poly, PolyBasis};

fn quadric_system(ring: &FpPolyRing) -> Vec<Poly<Vec<u16>>> {
    vec![
        ring.poly_from_terms(&[(1, &[2, 0, 0]), (1, &[0, 1, 1])]), // x^2 + yz
        ring.poly_from_terms(&[(1, &[0, 2, 0]), (1, &[1, 0, 1])]), // y^2 + xz
        ring.poly_from_terms(&[(1, &[0, 0, 2]), (1, &[1, 1, 0])]), // z^2 + xy
    ]
}

fn bench_matrix_build(c: &mut Criterion) {
    let ring = FpPolyRing::new(32003, 3, MonomialOrder::GrevLex);
    let polys = quadric_system(&ring);
    let basis = PolyBasis::with_polys(&ring, polys.clone());

    c.bench_function("build_quad_matrix_3_spairs", |b| {
        b.iter(|| {
            let mut builder = MatrixBuilder::new(&basis, 1 << 16).unwrap();
            builder.add_s_pair(&polys[0], &polys[1]);
            builder.add_s_pair(&polys[0], &polys[2]);
            builder.add_s_pair(&polys[1], &polys[2]);
            black_box(builder.build_and_clear().unwrap())
        })
    });
}

fn bench_f4_cyclic3(c: &mut Criterion) {
    let ring = FpPolyRing::new(32003, 3, MonomialOrder::GrevLex);
    let input = vec![
        ring.poly_from_terms(&[(1, &[1, 0, 0]), (1, &[0, 1, 0]), (1, &[0, 0, 1])]),
        ring.poly_from_terms(&[(1, &[1, 1, 0]), (1, &[0, 1, 1]), (1, &[1, 0, 1])]),
        ring.poly_from_terms(&[(1, &[1, 1, 1]), (-1, &[0, 0, 0])]),
    ];

    c.bench_function("f4_cyclic3", |b| {
        b.iter(|| black_box(f4_simple(&ring, input.clone())))
    });
}

criterion_group!(benches, bench_matrix_build, bench_f4_cyclic3);
criterion_main!(benches);
