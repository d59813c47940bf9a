mod runtime;
mod test_proxy;
