pub mod geo_math;
pub mod path_point;
pub mod place;
pub mod snapshot;
pub mod trip_record;
