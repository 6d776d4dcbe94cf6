//! Generated gRPC contracts consumed by the check-in service.

pub mod attendance {
    tonic::include_proto!("attendance");
}

pub mod schedule {
    tonic::include_proto!("schedule");
}
