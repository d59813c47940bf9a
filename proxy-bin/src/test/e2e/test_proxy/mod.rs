mod chaos_config;
mod faults;
mod forwarding;
mod load;
mod observe;
