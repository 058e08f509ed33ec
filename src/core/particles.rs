//! Particle systems: free points with a lifetime, collided as spheres of a common radius.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::core::shapes::{ParticlesShape, Shape};

/// One particle. A negative lifetime never expires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub position: DVec3,
    pub velocity: DVec3,
    pub lifetime: f64,
}

impl Particle {
    pub fn new(position: DVec3, velocity: DVec3, lifetime: f64) -> Self {
        Self {
            position,
            velocity,
            lifetime,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleSystemParameters {
    pub max_particles: usize,
    pub radius: f64,
    /// Fraction of the normal velocity reflected by a collision.
    pub restitution: f64,
    /// Fraction of the tangential velocity removed by a collision.
    pub friction: f64,
    pub linear_damping: f64,
    pub is_gravity_enabled: bool,
}

impl Default for ParticleSystemParameters {
    fn default() -> Self {
        Self {
            max_particles: 1000,
            radius: 0.01,
            restitution: 0.0,
            friction: 0.0,
            linear_damping: 0.0,
            is_gravity_enabled: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParticleSystem {
    pub name: String,
    parameters: ParticleSystemParameters,
    particles: Vec<Particle>,
    pub is_active: bool,
}

impl ParticleSystem {
    pub fn new(name: impl Into<String>, parameters: ParticleSystemParameters) -> Self {
        Self {
            name: name.into(),
            parameters,
            particles: Vec::new(),
            is_active: true,
        }
    }

    pub fn parameters(&self) -> &ParticleSystemParameters {
        &self.parameters
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Returns `false` when the system is full.
    pub fn add_particle(&mut self, particle: Particle) -> bool {
        if self.particles.len() >= self.parameters.max_particles {
            return false;
        }
        self.particles.push(particle);
        true
    }

    pub fn clear(&mut self) {
        self.particles.clear();
    }

    pub fn positions(&self) -> Vec<DVec3> {
        self.particles.iter().map(|p| p.position).collect()
    }

    /// Ages the particles, drops the expired ones and integrates the others.
    pub fn update(&mut self, dt: f64, gravity: DVec3) {
        let acceleration = if self.parameters.is_gravity_enabled {
            gravity
        } else {
            DVec3::ZERO
        };
        let damping = 1.0 / (1.0 + dt * self.parameters.linear_damping);
        self.particles.retain_mut(|particle| {
            if particle.lifetime >= 0.0 {
                particle.lifetime -= dt;
                if particle.lifetime <= 0.0 {
                    return false;
                }
            }
            particle.velocity = (particle.velocity + acceleration * dt) * damping;
            particle.position += particle.velocity * dt;
            particle.position.is_finite() && particle.velocity.is_finite()
        });
    }

    /// Pushes particle `index` out along `normal` by `depth` and applies restitution and
    /// friction to its velocity. `normal` points away from the obstacle.
    pub fn resolve_collision(&mut self, index: usize, normal: DVec3, depth: f64) {
        let ParticleSystemParameters {
            restitution,
            friction,
            ..
        } = self.parameters;
        let Some(particle) = self.particles.get_mut(index) else {
            return;
        };
        if depth > 0.0 {
            particle.position += normal * depth;
        }
        let normal_speed = particle.velocity.dot(normal);
        if normal_speed < 0.0 {
            let tangential = particle.velocity - normal * normal_speed;
            particle.velocity =
                tangential * (1.0 - friction).max(0.0) - normal * (normal_speed * restitution);
        }
    }

    pub fn collision_shape(&self) -> Shape {
        Shape::Particles(ParticlesShape::new(self.parameters.radius, self.positions()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn expired_particles_are_removed() {
        let mut system = ParticleSystem::new("sparks", ParticleSystemParameters::default());
        assert!(system.add_particle(Particle::new(DVec3::ZERO, DVec3::ZERO, 0.015)));
        assert!(system.add_particle(Particle::new(DVec3::ZERO, DVec3::ZERO, -1.0)));
        system.update(0.01, DVec3::ZERO);
        assert_eq!(system.len(), 2);
        system.update(0.01, DVec3::ZERO);
        assert_eq!(system.len(), 1);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut system = ParticleSystem::new(
            "small",
            ParticleSystemParameters {
                max_particles: 1,
                ..ParticleSystemParameters::default()
            },
        );
        assert!(system.add_particle(Particle::new(DVec3::ZERO, DVec3::ZERO, -1.0)));
        assert!(!system.add_particle(Particle::new(DVec3::ONE, DVec3::ZERO, -1.0)));
    }

    #[test]
    fn collision_removes_normal_velocity() {
        let mut system = ParticleSystem::new(
            "rain",
            ParticleSystemParameters {
                friction: 0.5,
                ..ParticleSystemParameters::default()
            },
        );
        system.add_particle(Particle::new(
            DVec3::new(0.0, -0.1, 0.0),
            DVec3::new(2.0, -3.0, 0.0),
            -1.0,
        ));
        system.resolve_collision(0, DVec3::Y, 0.1);
        let particle = system.particles()[0];
        assert_relative_eq!(particle.position.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(particle.velocity.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(particle.velocity.x, 1.0, epsilon = 1e-12);
    }
}
