mod args_test;
mod run_test;
mod transport_test;
