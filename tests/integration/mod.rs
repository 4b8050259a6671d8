mod test_generation;
mod test_lifecycle;
mod test_topology;
