// src/body.rs

use nalgebra::Vector2;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub mass: f64,
    pub position: Vector2<f64>,
    pub velocity: Vector2<f64>,
}

impl Body {
    pub fn new(mass: f64, position: Vector2<f64>, velocity: Vector2<f64>) -> Self {
        Body {
            mass,
            position,
            velocity,
        }
    }

    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.mass * self.velocity.norm_squared()
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Body(m={:.2e}, p=[{:.2e}, {:.2e}], v=[{:.2e}, {:.2e}])",
            self.mass, self.position.x, self.position.y, self.velocity.x, self.velocity.y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_scientific_notation() {
        let b = Body::new(5.972e24, Vector2::new(-1.5e8, 0.0), Vector2::new(0.0, 1000.0));
        assert_eq!(
            b.to_string(),
            "Body(m=5.97e24, p=[-1.50e8, 0.00e0], v=[0.00e0, 1.00e3])"
        );
    }

    #[test]
    fn kinetic_energy_of_moving_body() {
        let b = Body::new(2.0, Vector2::zeros(), Vector2::new(3.0, 4.0));
        assert_eq!(b.kinetic_energy(), 25.0);
    }
}
