fn main() {
    env_logger::init();
    std::process::exit(nua_drv::main());
}
