// Integration tests for per-geometry actuator kinematics

#[cfg(test)]
mod tests {
    use krusty_kinematics::motion::kinematics::{
        CartesianStepper, CoreXYSign, CoreXYStepper, DeltaStepper, KinematicsError, PolarAxis, PolarStepper,
        StepperKinematics, WinchStepper,
    };
    use krusty_kinematics::motion::trapq::{Axis, Coord, Move};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_coord(rng: &mut StdRng, range: f64) -> Coord {
        Coord::new(
            rng.random_range(-range..range),
            rng.random_range(-range..range),
            rng.random_range(-range..range),
        )
    }

    #[test]
    fn test_cartesian_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let c = random_coord(&mut rng, 300.0);
            for axis in Axis::ALL {
                let k = StepperKinematics::Cartesian(CartesianStepper::new(axis));
                assert_eq!(k.position_at(&c, 0.0), Ok(c.get(axis)));
            }
        }
    }

    #[test]
    fn test_delta_reachability() {
        let k = StepperKinematics::Delta(DeltaStepper::new(200.0, 0.0, 150.0).unwrap());
        // Directly under the tower the arm is vertical
        assert_eq!(k.position_at(&Coord::new(0.0, 150.0, 10.0), 0.0), Ok(210.0));
        // Exactly at arm's length the arm is horizontal
        assert_eq!(k.position_at(&Coord::new(0.0, -50.0, 0.0), 0.0), Ok(0.0));
        assert!(matches!(
            k.velocity_at(&Coord::new(0.0, -50.0, 0.0), &Coord::new(0.0, 1.0, 0.0)),
            Err(KinematicsError::Singularity(_))
        ));
        // Beyond arm's length is an error, never a clamp
        assert!(matches!(
            k.position_at(&Coord::new(0.0, -50.1, 0.0), 0.0),
            Err(KinematicsError::OutOfReach { .. })
        ));
    }

    #[test]
    fn test_velocity_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(3);
        let geometries = [
            StepperKinematics::CoreXY(CoreXYStepper::new(CoreXYSign::Minus)),
            StepperKinematics::Delta(DeltaStepper::new(250.0, -86.6, -50.0).unwrap()),
            StepperKinematics::Polar(PolarStepper::new(PolarAxis::Radius)),
            StepperKinematics::Polar(PolarStepper::new(PolarAxis::Angle)),
            StepperKinematics::Winch(WinchStepper::new(Coord::new(0.0, 300.0, 400.0)).unwrap()),
        ];
        let dt = 1e-6;
        for _ in 0..50 {
            let c = random_coord(&mut rng, 60.0);
            let v = random_coord(&mut rng, 100.0);
            for k in &geometries {
                let at = |s: f64| Coord::new(c.x + v.x * s, c.y + v.y * s, c.z + v.z * s);
                let last = k.position_at(&c, 0.0).unwrap();
                let fd = (k.position_at(&at(dt), last).unwrap() - k.position_at(&at(-dt), last).unwrap()) / (2.0 * dt);
                let analytic = k.velocity_at(&c, &v).unwrap();
                assert!((fd - analytic).abs() < 1e-4 * (1.0 + analytic.abs()), "{} fd {} analytic {}", k.name(), fd, analytic);
            }
        }
    }

    #[test]
    fn test_polar_angle_stays_continuous_around_circle() {
        let k = StepperKinematics::Polar(PolarStepper::new(PolarAxis::Angle));
        let mut last = 0.0;
        // Two full turns counter-clockwise
        for i in 1..=720 {
            let a = (i as f64).to_radians();
            last = k.position_at(&Coord::new(10.0 * a.cos(), 10.0 * a.sin(), 0.0), last).unwrap();
            assert!((last - a).abs() < 1e-9, "step {}", i);
        }
    }

    #[test]
    fn test_raw_position_along_move() {
        let m = Move::fill(0.0, 0.0, 1.0, 0.0, Coord::new(3.0, 4.0, 0.0), Coord::new(6.0, 8.0, 0.0), 10.0, 10.0, 0.0).unwrap();
        let winch = StepperKinematics::Winch(WinchStepper::new(Coord::default()).unwrap());
        // Moving radially away from the anchor: string grows at the feed rate
        assert!((winch.calc_position(&m, 0.5, 0.0).unwrap() - 10.0).abs() < 1e-12);
        let b = StepperKinematics::CoreXY(CoreXYStepper::new(CoreXYSign::Plus));
        assert!((b.calc_position(&m, 1.0, 0.0).unwrap() - 21.0).abs() < 1e-12);
    }
}
