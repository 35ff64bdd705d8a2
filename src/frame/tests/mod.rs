mod test_encode;
