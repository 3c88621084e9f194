mod tests_frozen;
