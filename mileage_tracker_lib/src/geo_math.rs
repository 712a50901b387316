/// Mean radius of the earth in statute miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;
pub const METERS_PER_MILE: f64 = 1609.344;

/// Great-circle distance in miles between two coordinates given in degrees.
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();

    let a = f64::sin(d_lat / 2.).powi(2)
        + f64::cos(lat1) * f64::cos(lat2) * f64::sin(d_lon / 2.).powi(2);
    // Rounding can push `a` a hair above 1 for antipodal points
    let c = 2. * f64::asin(f64::sqrt(a.min(1.)));

    EARTH_RADIUS_MILES * c
}

pub fn meters_to_miles(meters: f64) -> f64 {
    meters / METERS_PER_MILE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_north_step() {
        // 0.0004 degrees of latitude
        let d = haversine_miles(40.0, -75.0, 40.0004, -75.0);
        assert!((d - 0.02764).abs() < 0.0001, "got {d}");
    }

    #[test]
    fn same_point_is_zero() {
        assert_eq!(haversine_miles(18.2208, -66.5901, 18.2208, -66.5901), 0.0);
    }

    #[test]
    fn symmetric() {
        let there = haversine_miles(40.7128, -74.0060, 34.0522, -118.2437);
        let back = haversine_miles(34.0522, -118.2437, 40.7128, -74.0060);
        assert!((there - back).abs() < 1e-9);
        // New York to Los Angeles is roughly 2445 miles
        assert!((there - 2445.0).abs() < 10.0, "got {there}");
    }

    #[test]
    fn unit_conversion() {
        assert!((meters_to_miles(50.0) - 0.031069).abs() < 1e-6);
    }
}
