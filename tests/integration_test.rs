// Integration tests for the whole rendering path
//
// These tests drive template text through scanning, expression parsing,
// pipeline evaluation and partial invocation together, using the classic
// Northwind-style fixtures the filter dialect grew up with.

use indexmap::IndexMap;
use pagemill::evaluator::EvaluationError;
use pagemill::{escape_html, ErrorPolicy, RenderError, TemplateContext, Value, DEFAULT_DATE_FORMAT_ARG};
use serde_json::json;

fn products() -> serde_json::Value {
    json!([
        {"ProductId": 1,  "ProductName": "Chai",                     "UnitsInStock": 39},
        {"ProductId": 2,  "ProductName": "Chang",                    "UnitsInStock": 17},
        {"ProductId": 5,  "ProductName": "Chef Anton's Gumbo Mix",   "UnitsInStock": 0},
        {"ProductId": 11, "ProductName": "Queso Cabrales",           "UnitsInStock": 22},
        {"ProductId": 17, "ProductName": "Alice Mutton",             "UnitsInStock": 0},
        {"ProductId": 24, "ProductName": "Guaraná Fantástica",       "UnitsInStock": 20},
        {"ProductId": 29, "ProductName": "Thüringer Rostbratwurst",  "UnitsInStock": 0},
        {"ProductId": 31, "ProductName": "Gorgonzola Telino",        "UnitsInStock": 0},
        {"ProductId": 50, "ProductName": "Valkoinen suklaa",         "UnitsInStock": 65},
        {"ProductId": 53, "ProductName": "Perth Pasties",            "UnitsInStock": 0},
        {"ProductId": 60, "ProductName": "Camembert Pierrot",        "UnitsInStock": 19},
    ])
}

fn customers() -> serde_json::Value {
    json!([
        {
            "CustomerId": "ALFKI",
            "CompanyName": "Alfreds Futterkiste",
            "Region": null,
            "Orders": []
        },
        {
            "CustomerId": "LAZYK",
            "CompanyName": "Lazy K Kountry Store",
            "Region": "WA",
            "Orders": [
                {"OrderId": 10482, "OrderDate": "1997-03-21T00:00:00"},
                {"OrderId": 10545, "OrderDate": "1997-05-22T00:00:00"}
            ]
        },
        {
            "CustomerId": "TRAIH",
            "CompanyName": "Trail's Head Gourmet Provisioners",
            "Region": "WA",
            "Orders": [
                {"OrderId": 10574, "OrderDate": "1997-06-19T00:00:00"},
                {"OrderId": 10577, "OrderDate": "1997-06-23T00:00:00"},
                {"OrderId": 10822, "OrderDate": "1998-01-08T00:00:00"}
            ]
        },
        {
            "CustomerId": "BONAP",
            "CompanyName": "Bon app'",
            "Region": "Marseille",
            "Orders": [
                {"OrderId": 10331, "OrderDate": "1996-10-16T00:00:00"}
            ]
        }
    ])
}

fn create_context() -> TemplateContext {
    let mut context = TemplateContext::new();
    context.set_arg("numbers", json!([5, 4, 1, 3, 9, 8, 6, 7, 2, 0]));
    context.set_arg("products", products());
    context.set_arg("customers", customers());
    context
}

/// Expected output of the Washington-customers pages, shared by every
/// partial-invocation variant below.
const WA_CUSTOMERS_EXPECTED: &str = "\nCustomers from Washington and their orders:\n\
Customer LAZYK Lazy K Kountry Store\n\
\u{20} Order 10482: 1997/03/21\n\
\u{20} Order 10545: 1997/05/22\n\
Customer TRAIH Trail's Head Gourmet Provisioners\n\
\u{20} Order 10574: 1997/06/19\n\
\u{20} Order 10577: 1997/06/23\n\
\u{20} Order 10822: 1998/01/08\n";

#[test]
fn numbers_below_five_filter_by_value_not_position() {
    let context = create_context();

    let out = context
        .render_template("{{ numbers | where('it < 5') | select('{{ it }}\n') }}")
        .unwrap();
    assert_eq!(out, "4\n1\n3\n2\n0\n");
}

#[test]
fn numbers_below_five_with_surrounding_text() {
    let context = create_context();

    let out = context
        .render_template("\nNumbers < 5:\n{{ numbers | where('it < 5') | select('{{ it }}\n') }}")
        .unwrap();
    assert_eq!(out, "\nNumbers < 5:\n4\n1\n3\n2\n0\n");
}

#[test]
fn sold_out_products_in_source_order() {
    let context = create_context();

    let out = context
        .render_template(
            "Sold out products:\n{{ products \n   | where('it.UnitsInStock = 0') \n   | select('{{ it.productName | raw }} is sold out!\n')\n}}",
        )
        .unwrap();

    assert_eq!(
        out,
        "Sold out products:\n\
         Chef Anton's Gumbo Mix is sold out!\n\
         Alice Mutton is sold out!\n\
         Thüringer Rostbratwurst is sold out!\n\
         Gorgonzola Telino is sold out!\n\
         Perth Pasties is sold out!\n"
    );
}

#[test]
fn sold_out_products_with_custom_item_binding() {
    let context = create_context();

    let unbound = context
        .render_template(
            "{{ products | where('it.UnitsInStock = 0') | select('{{ it.productName | raw }} is sold out!\n') }}",
        )
        .unwrap();
    let rebound = context
        .render_template(
            "{{ products \
               | where('product.UnitsInStock = 0', { it: 'product' }) \
               | select('{{ product.productName | raw }} is sold out!\n', { it: 'product' }) }}",
        )
        .unwrap();

    assert_eq!(rebound, unbound);
}

#[test]
fn rebinding_numbers_alias_matches_unbound_form() {
    let context = create_context();

    let unbound = context
        .render_template("{{ numbers | where('it < 5') | select('{{ it }}\n') }}")
        .unwrap();
    let rebound = context
        .render_template("{{ numbers | where('n < 5', { it: 'n' }) | select('{{ n }}\n', { it: 'n' }) }}")
        .unwrap();

    assert_eq!(rebound, unbound);
}

#[test]
fn where_is_idempotent() {
    let context = create_context();

    let once = context
        .render_template("{{ numbers | where('it < 5') | select('{{ it }} ') }}")
        .unwrap();
    let twice = context
        .render_template("{{ numbers | where('it < 5') | where('it < 5') | select('{{ it }} ') }}")
        .unwrap();

    assert_eq!(twice, once);
}

#[test]
fn colon_form_and_fluent_form_parse_to_the_same_result() {
    let context = create_context();

    let colon = context
        .render_template("{{ customers | where: it.Region = 'WA' | count }}")
        .unwrap();
    let fluent = context
        .render_template("{{ customers | where('it.Region = \\'WA\\'') | count }}")
        .unwrap();

    assert_eq!(colon, "2");
    assert_eq!(fluent, colon);
}

#[test]
fn assign_to_is_visible_to_later_placeholders() {
    let context = create_context();

    let out = context
        .render_template(
            "{{ numbers | where('it < 5') | assignTo: lows }}lows has {{ lows | count }} of {{ numbers | count }}",
        )
        .unwrap();
    assert_eq!(out, "lows has 5 of 10");
}

#[test]
fn assign_to_is_invisible_to_earlier_placeholders() {
    let context = create_context();

    // `lows` does not exist yet when the first placeholder runs
    let out = context
        .render_template("{{ lows | count }}|{{ numbers | assignTo: lows }}{{ lows | count }}")
        .unwrap();
    assert_eq!(out, "0|10");
}

#[test]
fn select_partial_with_fluent_page_argument() {
    let mut context = create_context();
    context.set_arg(DEFAULT_DATE_FORMAT_ARG, json!("yyyy/MM/dd"));

    context.add_page(
        "page.html",
        "{{ \n  customers \n  | where: it.Region = 'WA' \n  | assignTo: waCustomers \n}}\nCustomers from Washington and their orders:\n{{ waCustomers | selectPartial('customer') }}",
    );
    context.add_page(
        "customer.html",
        "Customer {{ it.CustomerId }} {{ it.CompanyName | raw }}\n{{ it.Orders | select(\"  Order {{ it.OrderId }}: {{ it.OrderDate | dateFormat | newLine }}\") }}",
    );

    assert_eq!(context.render_page("page").unwrap(), WA_CUSTOMERS_EXPECTED);
}

#[test]
fn select_partial_nested_colon_form() {
    let mut context = create_context();
    context.set_arg(DEFAULT_DATE_FORMAT_ARG, json!("yyyy/MM/dd"));

    context.add_page(
        "page.html",
        "{{ \n  customers \n  | where: it.Region = 'WA' \n  | assignTo: waCustomers \n}}\nCustomers from Washington and their orders:\n{{ waCustomers | selectPartial: customer }}",
    );
    context.add_page(
        "customer.html",
        "Customer {{ it.CustomerId }} {{ it.CompanyName | raw }}\n{{ it.Orders | selectPartial: order }}",
    );
    context.add_page(
        "order.html",
        "  Order {{ it.OrderId }}: {{ it.OrderDate | dateFormat}}\n",
    );

    assert_eq!(context.render_page("page").unwrap(), WA_CUSTOMERS_EXPECTED);
}

#[test]
fn select_partial_nested_with_alias_directive_and_call_site_binding() {
    let mut context = create_context();
    context.set_arg(DEFAULT_DATE_FORMAT_ARG, json!("yyyy/MM/dd"));

    context.add_page(
        "page.html",
        "{{ \n  customers \n  | where: it.Region = 'WA' \n  | assignTo: waCustomers \n}}\nCustomers from Washington and their orders:\n{{ waCustomers | selectPartial: customer }}",
    );
    // The customer page declares its own alias in a directive; the order
    // page gets its alias from the call-site binding map instead.
    context.add_page(
        "customer.html",
        "\n<!--\nit: cust\n-->\n\nCustomer {{ cust.CustomerId }} {{ cust.CompanyName | raw }}\n{{ cust.Orders | selectPartial('order', { it: 'order' })  }}",
    );
    context.add_page(
        "order.html",
        "  Order {{ order.OrderId }}: {{ order.OrderDate | dateFormat}}\n",
    );

    assert_eq!(context.render_page("page").unwrap(), WA_CUSTOMERS_EXPECTED);
}

#[test]
fn binding_mechanisms_are_interchangeable() {
    // Same alias supplied via in-page directive in one context and via
    // call-site binding map in another; outputs must match byte for byte.
    let mut directive_ctx = create_context();
    directive_ctx.set_arg(DEFAULT_DATE_FORMAT_ARG, json!("yyyy/MM/dd"));
    directive_ctx.add_page(
        "page.html",
        "{{ customers | where: it.Region = 'WA' | selectPartial: customer }}",
    );
    directive_ctx.add_page(
        "customer.html",
        "<!--\nit: cust\n-->\nCustomer {{ cust.CustomerId }}\n",
    );

    let mut binding_ctx = create_context();
    binding_ctx.set_arg(DEFAULT_DATE_FORMAT_ARG, json!("yyyy/MM/dd"));
    binding_ctx.add_page(
        "page.html",
        "{{ customers | where: it.Region = 'WA' | selectPartial('customer', { it: 'cust' }) }}",
    );
    binding_ctx.add_page("customer.html", "Customer {{ cust.CustomerId }}\n");

    assert_eq!(
        directive_ctx.render_page("page").unwrap(),
        binding_ctx.render_page("page").unwrap()
    );
}

#[test]
fn assign_to_locals_do_not_leak_into_partials() {
    let mut context = create_context();
    context.add_page(
        "page.html",
        "{{ numbers | assignTo: secret }}{{ customers | where: it.Region = 'WA' | selectPartial: probe }}",
    );
    // `secret` is a caller local; inside the partial it must resolve to
    // null and render as an empty count of 0.
    context.add_page("probe.html", "[{{ secret | count }}]");

    assert_eq!(context.render_page("page").unwrap(), "[0][0]");
}

#[test]
fn self_referential_partial_fails_with_recursion_error() {
    let mut context = create_context();
    context.set_max_partial_depth(8);
    context.set_arg("items", json!([1]));
    context.add_page("loop.html", "x{{ items | selectPartial: loop }}");

    let err = context.render_page("loop").unwrap_err();
    assert_eq!(
        err,
        RenderError::Eval(EvaluationError::PartialRecursion {
            name: "loop".to_string(),
            limit: 8,
        })
    );
}

#[test]
fn missing_partial_page_is_a_page_not_found_error() {
    let context = create_context();

    let err = context
        .render_template("{{ customers | selectPartial: nowhere }}")
        .unwrap_err();
    assert_eq!(
        err,
        RenderError::Eval(EvaluationError::PageNotFound {
            name: "nowhere".to_string()
        })
    );
}

#[test]
fn unknown_filter_names_the_filter() {
    let context = create_context();

    let err = context
        .render_template("{{ numbers | frobnicate }}")
        .unwrap_err();
    assert_eq!(
        err,
        RenderError::Eval(EvaluationError::UnknownFilter {
            name: "frobnicate".to_string()
        })
    );
}

#[test]
fn where_on_a_scalar_identifies_stage_and_kind() {
    let mut context = create_context();
    context.set_arg("name", json!("Chai"));

    let err = context
        .render_template("{{ name | where('it') }}")
        .unwrap_err();
    assert_eq!(
        err,
        RenderError::Eval(EvaluationError::TypeMismatch {
            stage: "where".to_string(),
            kind: "string",
        })
    );
}

#[test]
fn malformed_predicate_surfaces_immediately() {
    let context = create_context();

    let err = context
        .render_template("{{ numbers | where('it <') }}")
        .unwrap_err();
    assert!(matches!(
        err,
        RenderError::Eval(EvaluationError::Parse(_))
    ));
}

#[test]
fn unknown_binding_role_is_a_parse_error() {
    let context = create_context();

    let err = context
        .render_template("{{ products | where('p.UnitsInStock = 0', { item: 'p' }) }}")
        .unwrap_err();
    assert!(matches!(err, RenderError::Parse(_)));
}

#[test]
fn failed_placeholder_does_not_corrupt_siblings_under_inline_policy() {
    let mut context = create_context();
    context.set_error_policy(ErrorPolicy::InlineMarker);

    let out = context
        .render_template("start {{ numbers | frobnicate }} end {{ numbers | count }}")
        .unwrap();
    assert_eq!(out, "start [error: Unknown filter 'frobnicate'] end 10");
}

#[test]
fn raw_disables_the_escape_hook() {
    let mut context = create_context();
    context.set_escape(escape_html);

    let encoded = context
        .render_template("{{ products | where('it.ProductId = 5') | select('{{ it.ProductName }}') }}")
        .unwrap();
    assert_eq!(encoded, "Chef Anton&#39;s Gumbo Mix");

    let raw = context
        .render_template("{{ products | where('it.ProductId = 5') | select('{{ it.ProductName | raw }}') }}")
        .unwrap();
    assert_eq!(raw, "Chef Anton's Gumbo Mix");
}

#[test]
fn date_format_falls_back_to_built_in_default() {
    let mut context = create_context();
    context.set_arg("when", json!("1997-03-21T00:00:00"));

    assert_eq!(
        context.render_template("{{ when | dateFormat }}").unwrap(),
        "1997-03-21"
    );
}

#[test]
fn per_call_arguments_do_not_reach_partials() {
    let mut context = create_context();
    context.add_page("probe.html", "[{{ local | count }}]");

    let mut args = IndexMap::new();
    args.insert("local".to_string(), Value::from(vec![Value::from(1i64)]));
    // Visible in the page itself, absent inside the partial.
    let out = context
        .render_template_with(
            "{{ local | count }}{{ customers | where: it.Region = 'WA' | selectPartial: probe }}",
            args,
        )
        .unwrap();
    assert_eq!(out, "1[0][0]");
}

#[test]
fn member_access_count_on_sequences() {
    let context = create_context();

    let out = context
        .render_template("{{ customers | where('it.Orders.Count > 1') | select('{{ it.CustomerId }} ') }}")
        .unwrap();
    assert_eq!(out, "LAZYK TRAIH ");
}
