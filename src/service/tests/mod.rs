mod tests_chunks;
