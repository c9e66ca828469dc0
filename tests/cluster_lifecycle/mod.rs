mod membership_test;
mod start_stop_test;
