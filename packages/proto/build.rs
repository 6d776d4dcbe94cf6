fn main() -> Result<(), Box<dyn std::error::Error>> {
    let fds = protox::compile(["proto/attendance.proto", "proto/schedule.proto"], ["proto/"])?;

    // The check-in service is only ever a client of these contracts; servers
    // are generated too so tests and sibling services can stand up fakes.
    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_fds(fds)?;

    Ok(())
}
