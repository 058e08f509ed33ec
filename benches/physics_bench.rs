use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use deformable_physics::{core::mesh::TriangleMesh, *};
use std::{hint::black_box, sync::Arc};

const DT: f64 = 1e-3;

fn prepare_world(ball_count: usize, parallel: bool) -> PhysicsManager {
    let manager = PhysicsManager::new(PhysicsConfig {
        parallel,
        ..PhysicsConfig::default()
    });
    let floor = manager.add_representation(FixedRepresentation::new("floor", Pose::IDENTITY));
    manager.add_collision_representation(
        CollisionRepresentation::builder(Arc::new(Shape::plane()))
            .representation(floor)
            .build(),
    );
    for i in 0..ball_count {
        let pose = Pose::from_translation(DVec3::new(i as f64 * 0.3, 0.09, 0.0));
        let ball = RigidRepresentation::new(
            format!("ball {i}"),
            Arc::new(Shape::sphere(0.1)),
            RigidParameters::default(),
            pose,
        )
        .expect("valid ball");
        let id = manager.add_representation(ball);
        manager.add_collision_representation(
            CollisionRepresentation::builder(Arc::new(Shape::sphere(0.1)))
                .representation(id)
                .build(),
        );
    }
    manager.process_components();
    manager
}

fn bench_world_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");
    for &count in &[16usize, 64, 128] {
        for (label, parallel) in [("sequential", false), ("parallel", true)] {
            group.bench_with_input(BenchmarkId::new(label, count), &count, |b, &count| {
                let manager = prepare_world(count, parallel);
                b.iter(|| manager.update(black_box(DT)))
            });
        }
    }
    group.finish();
}

fn cloth(resolution: usize) -> MassSpringRepresentation {
    let corners = [
        DVec3::new(0.0, 1.0, 0.0),
        DVec3::new(1.0, 1.0, 0.0),
        DVec3::new(1.0, 1.0, 1.0),
        DVec3::new(0.0, 1.0, 1.0),
    ];
    let parameters = MassSpringParameters {
        integration_scheme: IntegrationScheme::ImplicitEuler,
        ..MassSpringParameters::default()
    };
    let pinned = [0, resolution - 1];
    MassSpringRepresentation::grid_2d("cloth", corners, [resolution; 2], &pinned, parameters)
        .expect("valid cloth")
}

fn bench_cloth_free_motion(c: &mut Criterion) {
    let mut group = c.benchmark_group("cloth_free_motion");
    for &resolution in &[5usize, 10, 15] {
        group.bench_with_input(
            BenchmarkId::new("implicit_euler", resolution),
            &resolution,
            |b, &resolution| {
                let mut representation = Representation::from(cloth(resolution));
                let gravity = DVec3::new(0.0, -9.81, 0.0);
                b.iter(|| black_box(representation.free_motion(DT, gravity)))
            },
        );
    }
    group.finish();
}

fn grid_mesh(resolution: usize) -> TriangleMesh {
    let mut vertices = Vec::new();
    let mut triangles = Vec::new();
    for z in 0..=resolution {
        for x in 0..=resolution {
            vertices.push(DVec3::new(x as f64, 0.0, z as f64) / resolution as f64);
        }
    }
    let width = resolution + 1;
    for z in 0..resolution {
        for x in 0..resolution {
            let i = z * width + x;
            triangles.push([i, i + width, i + 1]);
            triangles.push([i + 1, i + width, i + width + 1]);
        }
    }
    TriangleMesh::new(vertices, triangles).expect("valid mesh")
}

fn bench_mesh_contacts(c: &mut Criterion) {
    let mut group = c.benchmark_group("mesh_sphere_dcd");
    let table = ContactCalculationTable::with_defaults();
    let sphere = Shape::sphere(0.05);
    let sphere_pose = Pose::from_translation(DVec3::new(0.5, 0.02, 0.5));
    for &resolution in &[16usize, 32, 64] {
        let mesh = Shape::Mesh(grid_mesh(resolution));
        group.bench_with_input(BenchmarkId::new("contacts", resolution), &mesh, |b, mesh| {
            b.iter(|| {
                black_box(table.calculate_dcd(mesh, &Pose::IDENTITY, &sphere, black_box(&sphere_pose)))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_world_step, bench_cloth_free_motion, bench_mesh_contacts);
criterion_main!(benches);
