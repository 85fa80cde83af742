mod support;

mod copy;
